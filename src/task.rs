// 该文件是 Maogou （猫狗） 项目的一部分。
// src/task.rs - 任务执行
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc,
  },
  time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{
  input::{CapturedImage, InputError},
  model::{Model, ModelHandle},
  output::{Render, Submitted},
  pipeline::{ClassificationPipeline, Outcome, PipelineConfig, PipelineError},
  presentation::{PresentationQueue, QueueStatus},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    model: ModelHandle<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error>;
}

/// 一次任务的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub submitted: usize,
  pub delivered: usize,
  pub failed: usize,
  pub superseded: usize,
  pub unreadable: usize,
}

impl TaskSummary {
  pub fn resolved(&self) -> usize {
    self.delivered + self.failed + self.superseded
  }

  fn record(&mut self, outcome: &Outcome) {
    match outcome {
      Ok(_) => self.delivered += 1,
      Err(PipelineError::Superseded { .. }) => self.superseded += 1,
      Err(_) => self.failed += 1,
    }
  }
}

fn is_interrupted(interrupt: &Option<Arc<AtomicBool>>) -> bool {
  interrupt
    .as_ref()
    .map(|flag| flag.load(Ordering::SeqCst))
    .unwrap_or(false)
}

/// 依次提交所有照片，在当前线程上展示结果
#[derive(Debug, Default)]
pub struct OneShotTask {
  config: PipelineConfig,
  interrupt: Option<Arc<AtomicBool>>,
}

impl OneShotTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      config,
      interrupt: None,
    }
  }

  pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }
}

impl<I, M, O, RE> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = Result<CapturedImage, InputError>>,
  M: Model + 'static,
  O: Render<Outcome, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    model: ModelHandle<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let (queue, presentation) = PresentationQueue::new();
    let pipeline = ClassificationPipeline::new(model, self.config, presentation)?;
    let (tx, rx) = mpsc::channel::<(usize, Outcome)>();
    let mut requests: Vec<Submitted> = Vec::new();

    let mut summary = TaskSummary::default();
    for captured in input {
      let captured = match captured {
        Ok(captured) => captured,
        Err(e) => {
          error!("读取输入失败: {}", e);
          summary.unreadable += 1;
          continue;
        }
      };
      let tx = tx.clone();
      let index = requests.len();
      let id = pipeline.submit(captured.raw, move |outcome| {
        let _ = tx.send((index, outcome));
      });
      info!("已提交 {} -> {}", captured.source, id);
      requests.push(Submitted {
        id,
        source: captured.source,
      });
      summary.submitted += 1;
    }
    drop(tx);

    let now = Instant::now();
    while summary.resolved() < summary.submitted {
      if is_interrupted(&self.interrupt) {
        warn!(
          "中断信号接收，放弃剩余 {} 个请求",
          summary.submitted - summary.resolved()
        );
        break;
      }
      if queue.run_next(POLL_INTERVAL) == QueueStatus::Closed {
        break;
      }
      while let Ok((index, outcome)) = rx.try_recv() {
        summary.record(&outcome);
        output.render_result(&requests[index], &outcome)?;
      }
    }

    info!(
      "任务完成，耗时: {:.2?}，成功 {} / 失败 {} / 过期 {} / 不可读 {}",
      now.elapsed(),
      summary.delivered,
      summary.failed,
      summary.superseded,
      summary.unreadable
    );
    Ok(summary)
  }
}

/// 反复识别同一张照片，统计端到端耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  times: usize,
  config: PipelineConfig,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      times: 1000,
      config: PipelineConfig::default(),
    }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }

  pub fn with_config(mut self, config: PipelineConfig) -> Self {
    self.config = config;
    self
  }
}

impl<I, M, O, RE> Task<I, M, O> for RepeatShotTask
where
  I: Iterator<Item = Result<CapturedImage, InputError>>,
  M: Model + 'static,
  O: Render<Outcome, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    model: ModelHandle<M>,
    output: O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let captured = input
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入照片"))??;
    info!("输入照片 {} 获取成功，开始推理...", captured.source);

    let (queue, presentation) = PresentationQueue::new();
    let pipeline = ClassificationPipeline::new(model, self.config, presentation)?;
    let (tx, rx) = mpsc::channel::<Outcome>();

    let mut summary = TaskSummary::default();
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = Instant::now();
      let tx = tx.clone();
      let id = pipeline.submit(captured.raw.clone(), move |outcome| {
        let _ = tx.send(outcome);
      });
      summary.submitted += 1;

      let outcome = loop {
        if let Ok(outcome) = rx.try_recv() {
          break outcome;
        }
        if queue.run_next(POLL_INTERVAL) == QueueStatus::Closed {
          anyhow::bail!("展示队列已关闭");
        }
      };
      let elapsed = now.elapsed();
      info!("({})识别完成，耗时: {:.2?}", i, elapsed);
      summary.record(&outcome);
      let request = Submitted {
        id,
        source: captured.source.clone(),
      };
      output.render_result(&request, &outcome)?;
      times.push(elapsed);
    }

    // 前两次包含预热，不计入平均
    let warm: Vec<Duration> = if times.len() > 2 {
      times[2..].to_vec()
    } else {
      times
    };
    warn!(
      "平均识别时间: {:.2?}",
      warm.iter().sum::<Duration>() / warm.len() as u32
    );

    Ok(summary)
  }
}
