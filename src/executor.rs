// 该文件是 Maogou （猫狗） 项目的一部分。
// src/executor.rs - 后台推理线程池
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
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex, mpsc},
  thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum ExecutorError {
  #[error("推理线程池已关闭")]
  Closed,
  #[error("无法创建推理线程: {0}")]
  SpawnError(#[from] std::io::Error),
}

/// 固定数量的后台工作线程，任务通过通道分发
pub struct InferenceExecutor {
  sender: Mutex<Option<mpsc::Sender<Job>>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InferenceExecutor {
  pub fn new(workers: usize) -> Result<Self, ExecutorError> {
    let workers = workers.max(1);
    let (sender, receiver) = mpsc::channel::<Job>();
    let receiver = Arc::new(Mutex::new(receiver));

    let handles = (0..workers)
      .map(|index| {
        let receiver = receiver.clone();
        thread::Builder::new()
          .name(format!("maogou-infer-{}", index))
          .spawn(move || worker_loop(index, receiver))
      })
      .collect::<Result<Vec<_>, _>>()?;
    info!("推理线程池已启动，线程数: {}", workers);

    Ok(Self {
      sender: Mutex::new(Some(sender)),
      workers: Mutex::new(handles),
    })
  }

  pub fn spawn<F>(&self, job: F) -> Result<(), ExecutorError>
  where
    F: FnOnce() + Send + 'static,
  {
    let sender = self.sender.lock().map_err(|_| ExecutorError::Closed)?;
    match sender.as_ref() {
      Some(sender) => sender
        .send(Box::new(job))
        .map_err(|_| ExecutorError::Closed),
      None => Err(ExecutorError::Closed),
    }
  }

  /// 是否已停止接收新任务
  pub fn is_closed(&self) -> bool {
    self
      .sender
      .lock()
      .map(|sender| sender.is_none())
      .unwrap_or(true)
  }

  /// 停止接收新任务；已排队的任务仍会执行完毕
  pub fn shutdown(&self) {
    if let Ok(mut sender) = self.sender.lock() {
      sender.take();
    }

    let handles = match self.workers.lock() {
      Ok(mut workers) => std::mem::take(&mut *workers),
      Err(_) => return,
    };
    let current = thread::current().id();
    for handle in handles {
      // 最后一个引用可能在工作线程内被释放
      if handle.thread().id() == current {
        continue;
      }
      if handle.join().is_err() {
        warn!("推理线程异常退出");
      }
    }
  }
}

impl Drop for InferenceExecutor {
  fn drop(&mut self) {
    self.shutdown();
  }
}

fn worker_loop(index: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
  loop {
    let job = match receiver.lock() {
      Ok(receiver) => receiver.recv(),
      Err(_) => break,
    };
    let Ok(job) = job else {
      break;
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
      error!("推理线程 {} 的任务崩溃: {}", index, panic_message(&*payload));
    }
  }
  debug!("推理线程 {} 退出", index);
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "未知错误".to_string()
  }
}
