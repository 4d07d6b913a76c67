// 该文件是 Maogou （猫狗） 项目的一部分。
// src/presentation.rs - 展示线程任务队列
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
  marker::PhantomData,
  rc::Rc,
  sync::mpsc::{self, RecvTimeoutError, TryRecvError},
  thread::{self, ThreadId},
  time::Duration,
};

use thiserror::Error;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("展示队列已关闭")]
pub struct PresentationClosed;

/// 向展示线程投递任务的句柄，可在任意线程间传递
#[derive(Clone)]
pub struct PresentationHandle {
  sender: mpsc::Sender<Job>,
}

impl PresentationHandle {
  pub fn dispatch<F>(&self, job: F) -> Result<(), PresentationClosed>
  where
    F: FnOnce() + Send + 'static,
  {
    self
      .sender
      .send(Box::new(job))
      .map_err(|_| PresentationClosed)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
  /// 执行了一个任务
  Ran,
  /// 等待超时，没有任务
  Idle,
  /// 所有句柄都已释放，不会再有任务
  Closed,
}

/// 展示上下文：任务只在创建队列的线程上执行。
/// 队列本身既不能跨线程移动也不能共享。
pub struct PresentationQueue {
  receiver: mpsc::Receiver<Job>,
  owner: ThreadId,
  _not_send: PhantomData<Rc<()>>,
}

impl PresentationQueue {
  pub fn new() -> (Self, PresentationHandle) {
    let (sender, receiver) = mpsc::channel();
    let queue = Self {
      receiver,
      owner: thread::current().id(),
      _not_send: PhantomData,
    };
    (queue, PresentationHandle { sender })
  }

  pub fn owner(&self) -> ThreadId {
    self.owner
  }

  /// 执行当前已排队的全部任务，不阻塞
  pub fn run_pending(&self) -> usize {
    let mut count = 0;
    loop {
      match self.receiver.try_recv() {
        Ok(job) => {
          job();
          count += 1;
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
      }
    }
    if count > 0 {
      trace!("展示队列执行了 {} 个任务", count);
    }
    count
  }

  /// 最多等待 `timeout`，执行一个任务
  pub fn run_next(&self, timeout: Duration) -> QueueStatus {
    match self.receiver.recv_timeout(timeout) {
      Ok(job) => {
        job();
        QueueStatus::Ran
      }
      Err(RecvTimeoutError::Timeout) => QueueStatus::Idle,
      Err(RecvTimeoutError::Disconnected) => QueueStatus::Closed,
    }
  }

  /// 持续执行任务直到所有句柄被释放
  pub fn run(&self) {
    while let Ok(job) = self.receiver.recv() {
      job();
    }
  }
}
