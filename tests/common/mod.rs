// 该文件是 Maogou （猫狗） 项目的一部分。
// tests/common/mod.rs - 测试用模型与工具
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

#![allow(dead_code)]

use std::{
  io::Cursor,
  sync::{
    Arc, Condvar, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  thread::{self, ThreadId},
  time::{Duration, Instant},
};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use thiserror::Error;

use maogou::{
  frame::{InputSpec, ModelInput, TensorLayout},
  labels::LabelSet,
  model::{Model, ModelHandle},
  pipeline::Outcome,
  presentation::PresentationQueue,
};

pub const SIDE: u32 = 8;
pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];

#[derive(Error, Debug)]
#[error("scripted engine failure")]
pub struct ScriptedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
  Scores,
  Fail,
  Panic,
}

/// 阻塞红色照片的推理，直到被打开
#[derive(Default)]
pub struct Gate {
  open: Mutex<bool>,
  cond: Condvar,
}

impl Gate {
  pub fn open(&self) {
    *self.open.lock().unwrap() = true;
    self.cond.notify_all();
  }

  fn wait(&self) {
    let mut open = self.open.lock().unwrap();
    while !*open {
      open = self.cond.wait(open).unwrap();
    }
  }
}

pub struct ScriptedModel {
  scores: Vec<f32>,
  behaviour: Behaviour,
  calls: Arc<AtomicUsize>,
  gate: Option<Arc<Gate>>,
}

impl ScriptedModel {
  pub fn new(scores: Vec<f32>) -> Self {
    Self {
      scores,
      behaviour: Behaviour::Scores,
      calls: Arc::new(AtomicUsize::new(0)),
      gate: None,
    }
  }

  pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
    self.behaviour = behaviour;
    self
  }

  pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
    self.gate = Some(gate);
    self
  }

  pub fn calls(&self) -> Arc<AtomicUsize> {
    self.calls.clone()
  }
}

impl Model for ScriptedModel {
  type Error = ScriptedError;

  fn input_spec(&self) -> InputSpec {
    InputSpec::new(SIDE, SIDE, TensorLayout::Nhwc)
  }

  fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, Self::Error> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if input.as_bytes().first() == Some(&255)
      && let Some(gate) = &self.gate
    {
      gate.wait();
    }
    match self.behaviour {
      Behaviour::Scores => Ok(self.scores.clone()),
      Behaviour::Fail => Err(ScriptedError),
      Behaviour::Panic => panic!("scripted engine crash"),
    }
  }
}

pub fn cat_dog_handle(model: ScriptedModel) -> ModelHandle<ScriptedModel> {
  ModelHandle::new(model, LabelSet::from_list("cat,dog").unwrap())
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
  let image = RgbImage::from_pixel(SIDE, SIDE, Rgb(color));
  let mut bytes = Vec::new();
  DynamicImage::ImageRgb8(image)
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}

pub struct Delivered {
  pub tag: &'static str,
  pub outcome: Outcome,
  pub thread: ThreadId,
}

/// 收集回调结果，记录回调所在线程
#[derive(Clone, Default)]
pub struct Deliveries(Arc<Mutex<Vec<Delivered>>>);

impl Deliveries {
  pub fn callback(&self, tag: &'static str) -> Box<dyn FnOnce(Outcome) + Send> {
    let inner = self.0.clone();
    Box::new(move |outcome| {
      inner.lock().unwrap().push(Delivered {
        tag,
        outcome,
        thread: thread::current().id(),
      })
    })
  }

  pub fn len(&self) -> usize {
    self.0.lock().unwrap().len()
  }

  pub fn count(&self, tag: &str) -> usize {
    self.0.lock().unwrap().iter().filter(|d| d.tag == tag).count()
  }

  pub fn outcome(&self, tag: &str) -> Option<Outcome> {
    self
      .0
      .lock()
      .unwrap()
      .iter()
      .find(|d| d.tag == tag)
      .map(|d| d.outcome.clone())
  }

  pub fn tags(&self) -> Vec<&'static str> {
    self.0.lock().unwrap().iter().map(|d| d.tag).collect()
  }

  pub fn threads(&self) -> Vec<ThreadId> {
    self.0.lock().unwrap().iter().map(|d| d.thread).collect()
  }
}

/// 在当前线程上执行展示任务，直到条件满足
pub fn drive_until(queue: &PresentationQueue, mut done: impl FnMut() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(10);
  while !done() {
    assert!(Instant::now() < deadline, "timed out waiting for deliveries");
    queue.run_next(Duration::from_millis(10));
  }
}

/// 等待后台状态满足条件，不执行展示任务
pub fn wait_until(mut done: impl FnMut() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(10);
  while !done() {
    assert!(Instant::now() < deadline, "timed out waiting for background work");
    thread::sleep(Duration::from_millis(5));
  }
}

/// 再给迟到的回调一点时间
pub fn settle(queue: &PresentationQueue) {
  let deadline = Instant::now() + Duration::from_millis(200);
  while Instant::now() < deadline {
    queue.run_next(Duration::from_millis(10));
  }
}
