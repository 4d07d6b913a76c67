// 该文件是 Maogou （猫狗） 项目的一部分。
// src/classifier.rs - 分类器
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
  panic::{self, AssertUnwindSafe},
  sync::{Arc, mpsc},
  time::{Duration, Instant},
};

use tracing::{debug, error};

use crate::{
  completion::Completion,
  executor::{ExecutorError, InferenceExecutor, panic_message},
  frame::{InputSpec, ModelInput},
  model::{ClassificationResult, InferenceError, Model, ModelHandle},
};

pub type ClassifyResult = Result<Vec<ClassificationResult>, InferenceError>;

/// 持有已加载模型的分类器，推理在后台线程池上执行
pub struct Classifier<M> {
  handle: Arc<ModelHandle<M>>,
  executor: InferenceExecutor,
}

impl<M: Model + 'static> Classifier<M> {
  pub fn new(handle: ModelHandle<M>, workers: usize) -> Result<Self, ExecutorError> {
    Ok(Self {
      handle: Arc::new(handle),
      executor: InferenceExecutor::new(workers)?,
    })
  }

  pub fn input_spec(&self) -> InputSpec {
    self.handle.input_spec()
  }

  pub fn model(&self) -> &ModelHandle<M> {
    &self.handle
  }

  /// 在当前线程上推理，引擎崩溃会被转换为 [`InferenceError::Panicked`]
  pub fn classify_blocking(&self, input: &ModelInput) -> ClassifyResult {
    run_inference(&self.handle, input)
  }

  /// 异步推理，完成后在后台线程上调用 `completion`，且恰好调用一次
  pub fn classify_then<F>(&self, input: ModelInput, completion: F)
  where
    F: FnOnce(ClassifyResult) + Send + 'static,
  {
    let handle = self.handle.clone();
    let completion = Completion::new(completion, || Err(InferenceError::Abandoned));
    let spawned = self.executor.spawn(move || {
      let result = run_inference(&handle, &input);
      completion.resolve(result);
    });
    if let Err(e) = spawned {
      // 任务已随错误一起被丢弃，completion 以 Abandoned 结束
      error!("无法提交推理任务: {}", e);
    }
  }

  /// 异步推理，返回可等待的票据
  pub fn classify(&self, input: ModelInput) -> InferenceTicket {
    let (sender, receiver) = mpsc::channel();
    self.classify_then(input, move |result| {
      let _ = sender.send(result);
    });
    InferenceTicket { receiver }
  }

  pub(crate) fn spawn<F>(&self, job: F) -> Result<(), ExecutorError>
  where
    F: FnOnce() + Send + 'static,
  {
    self.executor.spawn(job)
  }

  /// 关闭后台线程池，之后提交的请求都会以 Abandoned 结束
  pub fn shutdown(&self) {
    self.executor.shutdown();
  }

  pub fn is_shut_down(&self) -> bool {
    self.executor.is_closed()
  }
}

fn run_inference<M: Model>(handle: &ModelHandle<M>, input: &ModelInput) -> ClassifyResult {
  let now = Instant::now();
  let result = panic::catch_unwind(AssertUnwindSafe(|| handle.predict(input)))
    .unwrap_or_else(|payload| Err(InferenceError::Panicked(panic_message(&*payload))));

  match &result {
    Ok(results) => debug!(
      "推理完成，耗时: {:.2?}，结果数: {}",
      now.elapsed(),
      results.len()
    ),
    Err(e) => error!("推理失败: {}", e),
  }
  result
}

/// 异步推理的结果票据
pub struct InferenceTicket {
  receiver: mpsc::Receiver<ClassifyResult>,
}

impl InferenceTicket {
  pub fn wait(self) -> ClassifyResult {
    self
      .receiver
      .recv()
      .unwrap_or(Err(InferenceError::Abandoned))
  }

  /// 超时返回 `None`，票据仍可继续等待
  pub fn wait_timeout(&self, timeout: Duration) -> Option<ClassifyResult> {
    match self.receiver.recv_timeout(timeout) {
      Ok(result) => Some(result),
      Err(mpsc::RecvTimeoutError::Timeout) => None,
      Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(InferenceError::Abandoned)),
    }
  }
}
