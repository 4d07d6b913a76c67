// 该文件是 Maogou （猫狗） 项目的一部分。
// tests/pipeline.rs - 分类流水线集成测试
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

mod common;

use std::{
  sync::{Arc, atomic::Ordering},
  thread,
};

use common::*;
use maogou::{
  model::{ClassificationResult, InferenceError},
  pipeline::{ClassificationPipeline, PipelineConfig, PipelineError, StalePolicy},
  presentation::PresentationQueue,
};

#[test]
fn photo_is_classified_ranked_and_formatted() {
  let model = ScriptedModel::new(vec![0.2, 0.8]);
  let calls = model.calls();
  let (queue, presentation) = PresentationQueue::new();
  let pipeline =
    ClassificationPipeline::new(cat_dog_handle(model), PipelineConfig::default(), presentation)
      .unwrap();
  let deliveries = Deliveries::default();

  let id = pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("photo"));
  drive_until(&queue, || deliveries.len() == 1);

  let delivery = deliveries.outcome("photo").unwrap().unwrap();
  assert_eq!(delivery.id, id);
  assert_eq!(
    delivery.results,
    vec![
      ClassificationResult::new("dog", 0.8),
      ClassificationResult::new("cat", 0.2),
    ]
  );
  assert_eq!(
    delivery.report.to_string(),
    "Dog, confidence: 0.8\nCat, confidence: 0.2"
  );
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn callbacks_run_on_the_presentation_thread() {
  let (queue, presentation) = PresentationQueue::new();
  let config = PipelineConfig::default()
    .with_workers(3)
    .with_stale_policy(StalePolicy::DeliverAll);
  let pipeline = ClassificationPipeline::new(
    cat_dog_handle(ScriptedModel::new(vec![0.5, 0.5])),
    config,
    presentation,
  )
  .unwrap();
  let deliveries = Deliveries::default();

  for tag in ["a", "b", "c", "d"] {
    pipeline.submit(png_bytes(GREEN).into(), deliveries.callback(tag));
  }
  drive_until(&queue, || deliveries.len() == 4);

  let here = thread::current().id();
  assert!(deliveries.threads().iter().all(|&t| t == here));
}

#[test]
fn engine_failure_is_delivered_exactly_once() {
  let model = ScriptedModel::new(vec![0.5, 0.5]).with_behaviour(Behaviour::Fail);
  let (queue, presentation) = PresentationQueue::new();
  let pipeline =
    ClassificationPipeline::new(cat_dog_handle(model), PipelineConfig::default(), presentation)
      .unwrap();
  let deliveries = Deliveries::default();

  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("photo"));
  drive_until(&queue, || deliveries.len() == 1);
  settle(&queue);

  assert_eq!(deliveries.count("photo"), 1);
  assert!(matches!(
    deliveries.outcome("photo"),
    Some(Err(PipelineError::InferenceFailed(InferenceError::Engine(_))))
  ));
}

#[test]
fn engine_panic_becomes_a_failure() {
  let model = ScriptedModel::new(vec![0.5, 0.5]).with_behaviour(Behaviour::Panic);
  let (queue, presentation) = PresentationQueue::new();
  let pipeline =
    ClassificationPipeline::new(cat_dog_handle(model), PipelineConfig::default(), presentation)
      .unwrap();
  let deliveries = Deliveries::default();

  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("first"));
  drive_until(&queue, || deliveries.len() == 1);
  assert!(matches!(
    deliveries.outcome("first"),
    Some(Err(PipelineError::InferenceFailed(InferenceError::Panicked(_))))
  ));

  // 崩溃之后流水线仍可继续接收请求
  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("second"));
  drive_until(&queue, || deliveries.len() == 2);
  assert_eq!(deliveries.count("second"), 1);
}

#[test]
fn corrupt_photo_never_reaches_the_model() {
  let model = ScriptedModel::new(vec![0.5, 0.5]);
  let calls = model.calls();
  let (queue, presentation) = PresentationQueue::new();
  let pipeline =
    ClassificationPipeline::new(cat_dog_handle(model), PipelineConfig::default(), presentation)
      .unwrap();
  let deliveries = Deliveries::default();

  pipeline.submit(vec![0x00, 0x01, 0x02, 0x03].into(), deliveries.callback("corrupt"));
  drive_until(&queue, || deliveries.len() == 1);

  assert!(matches!(
    deliveries.outcome("corrupt"),
    Some(Err(PipelineError::PreprocessingFailed(_)))
  ));
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  // 预处理失败不影响后续请求
  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("next"));
  drive_until(&queue, || deliveries.len() == 2);
  assert!(deliveries.outcome("next").unwrap().is_ok());
}

#[test]
fn latest_submission_wins_over_slow_earlier_one() {
  let gate = Arc::new(Gate::default());
  let model = ScriptedModel::new(vec![0.9, 0.1]).with_gate(gate.clone());
  let calls = model.calls();
  let (queue, presentation) = PresentationQueue::new();
  let config = PipelineConfig::default().with_workers(2);
  let pipeline = ClassificationPipeline::new(cat_dog_handle(model), config, presentation).unwrap();
  let deliveries = Deliveries::default();

  // 旧请求先进入推理并被挡住，之后才提交新请求
  let slow = pipeline.submit(png_bytes(RED).into(), deliveries.callback("slow"));
  wait_until(|| calls.load(Ordering::SeqCst) == 1);
  let fast = pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("fast"));
  assert_eq!(pipeline.latest_submission(), Some(fast));

  drive_until(&queue, || deliveries.count("fast") == 1);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert_eq!(deliveries.count("slow"), 0);

  gate.open();
  drive_until(&queue, || deliveries.len() == 2);
  settle(&queue);

  assert!(deliveries.outcome("fast").unwrap().is_ok());
  assert_eq!(
    deliveries.outcome("slow"),
    Some(Err(PipelineError::Superseded {
      id: slow,
      latest: fast,
    }))
  );
  assert_eq!(deliveries.tags(), vec!["fast", "slow"]);
}

#[test]
fn queued_request_finishes_after_shutdown() {
  let gate = Arc::new(Gate::default());
  let model = ScriptedModel::new(vec![0.9, 0.1]).with_gate(gate.clone());
  let calls = model.calls();
  let (queue, presentation) = PresentationQueue::new();
  let config = PipelineConfig::default()
    .with_workers(1)
    .with_stale_policy(StalePolicy::DeliverAll);
  let pipeline = ClassificationPipeline::new(cat_dog_handle(model), config, presentation).unwrap();
  let deliveries = Deliveries::default();

  pipeline.submit(png_bytes(RED).into(), deliveries.callback("blocked"));
  wait_until(|| calls.load(Ordering::SeqCst) == 1);
  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("queued"));

  thread::scope(|scope| {
    let stopping = scope.spawn(|| pipeline.classifier().shutdown());
    wait_until(|| pipeline.classifier().is_shut_down());
    gate.open();
    drive_until(&queue, || deliveries.len() == 2);
    stopping.join().unwrap();
  });

  assert!(deliveries.outcome("blocked").unwrap().is_ok());
  assert!(deliveries.outcome("queued").unwrap().is_ok());
  assert_eq!(calls.load(Ordering::SeqCst), 2);

  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("late"));
  drive_until(&queue, || deliveries.len() == 3);
  assert_eq!(deliveries.outcome("late"), Some(Err(PipelineError::Abandoned)));
}

#[test]
fn deliver_all_reports_in_completion_order() {
  let gate = Arc::new(Gate::default());
  let model = ScriptedModel::new(vec![0.9, 0.1]).with_gate(gate.clone());
  let (queue, presentation) = PresentationQueue::new();
  let config = PipelineConfig::default()
    .with_workers(2)
    .with_stale_policy(StalePolicy::DeliverAll);
  let pipeline = ClassificationPipeline::new(cat_dog_handle(model), config, presentation).unwrap();
  let deliveries = Deliveries::default();

  pipeline.submit(png_bytes(RED).into(), deliveries.callback("slow"));
  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("fast"));

  drive_until(&queue, || deliveries.count("fast") == 1);
  gate.open();
  drive_until(&queue, || deliveries.len() == 2);

  assert_eq!(deliveries.tags(), vec!["fast", "slow"]);
  assert!(deliveries.outcome("slow").unwrap().is_ok());
  assert!(deliveries.outcome("fast").unwrap().is_ok());
}

#[test]
fn submissions_after_shutdown_are_abandoned() {
  let (queue, presentation) = PresentationQueue::new();
  let pipeline = ClassificationPipeline::new(
    cat_dog_handle(ScriptedModel::new(vec![0.5, 0.5])),
    PipelineConfig::default(),
    presentation,
  )
  .unwrap();
  let deliveries = Deliveries::default();

  pipeline.classifier().shutdown();
  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("late"));
  drive_until(&queue, || deliveries.len() == 1);

  assert_eq!(deliveries.outcome("late"), Some(Err(PipelineError::Abandoned)));
}

#[test]
fn top_k_limits_the_report() {
  let (queue, presentation) = PresentationQueue::new();
  let config = PipelineConfig::default().with_top_k(Some(1));
  let pipeline = ClassificationPipeline::new(
    cat_dog_handle(ScriptedModel::new(vec![0.3, 0.7])),
    config,
    presentation,
  )
  .unwrap();
  let deliveries = Deliveries::default();

  pipeline.submit(png_bytes(GREEN).into(), deliveries.callback("photo"));
  drive_until(&queue, || deliveries.len() == 1);

  let delivery = deliveries.outcome("photo").unwrap().unwrap();
  assert_eq!(delivery.report.lines(), &["Dog, confidence: 0.7".to_string()]);
}
