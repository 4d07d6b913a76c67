// 该文件是 Maogou （猫狗） 项目的一部分。
// src/main.rs - 主程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod args;

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use maogou::{
  FromUrl,
  input::InputWrapper,
  model::{ModelHandle, ModelWrapper},
  output::OutputWrapper,
  pipeline::PipelineConfig,
  task::{OneShotTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("Maogou 猫狗识别");
  info!("模型地址: {}", args.model);
  for input in &args.input {
    info!("输入来源: {}", input);
  }
  info!("输出方式: {}", args.output);

  let interrupt = Arc::new(AtomicBool::new(false));
  {
    let interrupt = interrupt.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，准备退出...");
      interrupt.store(true, Ordering::SeqCst);
    })?;
  }

  info!("正在加载模型...");
  let model: ModelHandle<ModelWrapper> = ModelHandle::from_url(&args.model)?;
  info!("模型加载完成，共 {} 个类别", model.labels().len());

  let inputs = args
    .input
    .iter()
    .map(InputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;
  let output = OutputWrapper::from_url(&args.output)?;

  let config = PipelineConfig::default()
    .with_workers(args.workers)
    .with_stale_policy(args.stale_policy)
    .with_resize(args.resize)
    .with_top_k(args.top_k);

  let summary = OneShotTask::new(config)
    .with_interrupt(interrupt)
    .run_task(inputs.into_iter().flatten(), model, output)?;

  info!(
    "处理完成: 提交 {}，成功 {}，失败 {}，过期 {}，不可读 {}",
    summary.submitted, summary.delivered, summary.failed, summary.superseded, summary.unreadable
  );
  Ok(())
}
