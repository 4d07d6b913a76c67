// 该文件是 Maogou （猫狗） 项目的一部分。
// src/pipeline.rs - 分类请求流水线
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
  fmt,
  str::FromStr,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::{
  classifier::Classifier,
  completion::Completion,
  executor::ExecutorError,
  model::{ClassificationResult, InferenceError, Model, ModelHandle},
  preprocess::{ImagePreprocessor, PreprocessError, RawImage, ResizeMode},
  presentation::PresentationHandle,
  rank::ResultRanker,
  report::{FormattedReport, ResultFormatter},
};

const DEFAULT_WORKERS: usize = 2;

/// 每次提交分配的编号，从 1 开始单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(u64);

impl SubmissionId {
  pub fn get(&self) -> u64 {
    self.0
  }

  #[cfg(test)]
  pub(crate) fn from_raw(id: u64) -> Self {
    Self(id)
  }
}

impl fmt::Display for SubmissionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// 旧请求在新请求提交后如何处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePolicy {
  /// 只交付最后一次提交的结果，更早的请求以 [`PipelineError::Superseded`] 结束
  #[default]
  LatestWins,
  /// 每个请求都交付结果，晚到的旧结果可能覆盖新结果
  DeliverAll,
}

impl FromStr for StalePolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "latest-wins" | "latest" => Ok(StalePolicy::LatestWins),
      "deliver-all" | "all" => Ok(StalePolicy::DeliverAll),
      other => Err(format!("未知的旧结果策略: {}", other)),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
  #[error("图像预处理失败: {0}")]
  PreprocessingFailed(String),
  #[error("推理失败: {0}")]
  InferenceFailed(#[from] InferenceError),
  #[error("请求 {id} 已被更新的请求 {latest} 取代")]
  Superseded { id: SubmissionId, latest: SubmissionId },
  #[error("请求在完成前被放弃")]
  Abandoned,
}

impl From<PreprocessError> for PipelineError {
  fn from(err: PreprocessError) -> Self {
    PipelineError::PreprocessingFailed(err.to_string())
  }
}

/// 成功交付给展示层的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
  pub id: SubmissionId,
  pub results: Vec<ClassificationResult>,
  pub report: FormattedReport,
}

pub type Outcome = Result<Delivery, PipelineError>;

/// 请求所处的阶段，仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
  Preprocessing,
  Inferring,
  Ranking,
  Delivered,
  Failed,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub workers: usize,
  pub stale_policy: StalePolicy,
  pub resize: ResizeMode,
  pub top_k: Option<usize>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      workers: DEFAULT_WORKERS,
      stale_policy: StalePolicy::default(),
      resize: ResizeMode::default(),
      top_k: None,
    }
  }
}

impl PipelineConfig {
  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers;
    self
  }

  pub fn with_stale_policy(mut self, stale_policy: StalePolicy) -> Self {
    self.stale_policy = stale_policy;
    self
  }

  pub fn with_resize(mut self, resize: ResizeMode) -> Self {
    self.resize = resize;
    self
  }

  pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
    self.top_k = top_k;
    self
  }
}

/// 跟踪最新提交，判断请求是否已过期
#[derive(Clone)]
struct Staleness {
  id: SubmissionId,
  latest: Arc<AtomicU64>,
  policy: StalePolicy,
}

impl Staleness {
  fn superseded_by(&self) -> Option<SubmissionId> {
    if self.policy == StalePolicy::DeliverAll {
      return None;
    }
    let latest = self.latest.load(Ordering::SeqCst);
    (latest > self.id.0).then_some(SubmissionId(latest))
  }

  fn check(&self) -> Result<(), PipelineError> {
    match self.superseded_by() {
      Some(latest) => Err(PipelineError::Superseded {
        id: self.id,
        latest,
      }),
      None => Ok(()),
    }
  }
}

/// 分类流水线：预处理与推理在后台线程池执行，
/// 最终结果被投递到展示队列上回调。
pub struct ClassificationPipeline<M> {
  preprocessor: ImagePreprocessor,
  classifier: Arc<Classifier<M>>,
  ranker: ResultRanker,
  formatter: ResultFormatter,
  presentation: PresentationHandle,
  policy: StalePolicy,
  next_id: AtomicU64,
  latest: Arc<AtomicU64>,
}

impl<M: Model + 'static> ClassificationPipeline<M> {
  pub fn new(
    handle: ModelHandle<M>,
    config: PipelineConfig,
    presentation: PresentationHandle,
  ) -> Result<Self, ExecutorError> {
    let preprocessor = ImagePreprocessor::new(handle.input_spec()).with_resize(config.resize);
    let classifier = Classifier::new(handle, config.workers)?;
    info!(
      "分类流水线已创建，输入: {}x{} {:?}，旧结果策略: {:?}",
      preprocessor.spec().width,
      preprocessor.spec().height,
      preprocessor.spec().layout,
      config.stale_policy
    );

    Ok(Self {
      preprocessor,
      classifier: Arc::new(classifier),
      ranker: ResultRanker::new().with_top_k(config.top_k),
      formatter: ResultFormatter,
      presentation,
      policy: config.stale_policy,
      next_id: AtomicU64::new(0),
      latest: Arc::new(AtomicU64::new(0)),
    })
  }

  pub fn classifier(&self) -> &Classifier<M> {
    &self.classifier
  }

  pub fn stale_policy(&self) -> StalePolicy {
    self.policy
  }

  /// 最近一次提交的编号
  pub fn latest_submission(&self) -> Option<SubmissionId> {
    match self.latest.load(Ordering::SeqCst) {
      0 => None,
      id => Some(SubmissionId(id)),
    }
  }

  /// 提交一张照片。`on_complete` 在展示队列上恰好被调用一次。
  pub fn submit<F>(&self, raw: RawImage, on_complete: F) -> SubmissionId
  where
    F: FnOnce(Outcome) + Send + 'static,
  {
    let id = SubmissionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    self.latest.fetch_max(id.0, Ordering::SeqCst);
    let staleness = Staleness {
      id,
      latest: self.latest.clone(),
      policy: self.policy,
    };
    info!("收到请求 {}", id);

    let sink = delivery_sink(self.presentation.clone(), staleness.clone(), on_complete);
    let preprocessor = self.preprocessor;
    let ranker = self.ranker;
    let formatter = self.formatter;
    let classifier = self.classifier.clone();

    let job = move || {
      let _span = info_span!("request", id = id.0).entered();

      if let Err(e) = staleness.check() {
        debug!("请求在预处理前已过期");
        return sink.resolve(Err(e));
      }

      debug!(state = ?RequestState::Preprocessing);
      let input = match preprocessor.prepare(raw) {
        Ok(input) => input,
        Err(e) => {
          warn!(state = ?RequestState::Failed, "图像预处理失败: {}", e);
          return sink.resolve(Err(e.into()));
        }
      };

      if let Err(e) = staleness.check() {
        debug!("请求在推理前已过期");
        return sink.resolve(Err(e));
      }

      // 推理在同一个后台任务内完成
      debug!(state = ?RequestState::Inferring);
      let outcome = match classifier.classify_blocking(&input) {
        Ok(results) => {
          debug!(state = ?RequestState::Ranking);
          let results = ranker.rank(results);
          let report = formatter.format(&results);
          Ok(Delivery {
            id,
            results,
            report,
          })
        }
        Err(e) => {
          warn!(state = ?RequestState::Failed, "推理失败: {}", e);
          Err(PipelineError::from(e))
        }
      };
      sink.resolve(outcome);
    };

    if let Err(e) = self.classifier.spawn(job) {
      // 任务被丢弃后 sink 以 Abandoned 交付
      error!("无法提交请求 {}: {}", id, e);
    }
    id
  }
}

/// 构造最终交付：切换到展示队列，并在回调前做最后一次过期检查
fn delivery_sink<F>(
  presentation: PresentationHandle,
  staleness: Staleness,
  on_complete: F,
) -> Completion<Outcome, impl FnOnce(Outcome) + Send + 'static>
where
  F: FnOnce(Outcome) + Send + 'static,
{
  let deliver = move |outcome: Outcome| {
    let id = staleness.id;
    let dispatched = presentation.dispatch(move || {
      let outcome = match outcome {
        Ok(delivery) => staleness.check().map(|_| delivery),
        Err(e) => Err(e),
      };
      match &outcome {
        Ok(_) => debug!(state = ?RequestState::Delivered, "请求 {} 已交付", id),
        Err(e) => debug!(state = ?RequestState::Failed, "请求 {} 失败: {}", id, e),
      }
      on_complete(outcome);
    });
    if dispatched.is_err() {
      warn!("展示队列已关闭，丢弃请求 {} 的结果", id);
    }
  };
  Completion::new(deliver, || Err(PipelineError::Abandoned))
}
