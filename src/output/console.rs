// 该文件是 Maogou （猫狗） 项目的一部分。
// src/output/console.rs - 控制台输出
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

use std::io::Write;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, Submitted},
  pipeline::{Outcome, PipelineError},
};

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 把报告打印到标准输出
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }
    Ok(ConsoleOutput)
  }
}

impl Render<Outcome> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(&self, request: &Submitted, result: &Outcome) -> Result<(), Self::Error> {
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    match result {
      Ok(delivery) => {
        info!("{} {} 识别完成", delivery.id, request.source);
        writeln!(stdout, "{}", request.source)?;
        writeln!(stdout, "Result string:\n{}", delivery.report)?;
      }
      Err(PipelineError::Superseded { id, latest }) => {
        info!("{} {} 已被 {} 取代，不显示", id, request.source, latest);
      }
      Err(e) => {
        warn!("{} {} 识别失败: {}", request.id, request.source, e);
        writeln!(stdout, "{}", request.source)?;
        writeln!(stdout, "Error: {}", e)?;
      }
    }
    stdout.flush()?;
    Ok(())
  }
}
