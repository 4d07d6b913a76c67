// 该文件是 Maogou （猫狗） 项目的一部分。
// src/model.rs - 模型
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

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[cfg(any(feature = "model_onnx", feature = "model_rknn"))]
use crate::FromUrlWithScheme;
use crate::{
  FromUrl,
  frame::{InputSpec, ModelInput},
  labels::{LabelError, LabelSet},
  url_query,
};

/// 推理后端。实现者只负责把一帧输入变成原始分数向量，
/// 标签映射与分数校验由 [`ModelHandle`] 完成。
pub trait Model: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn input_spec(&self) -> InputSpec;
  fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
  pub label: String,
  pub confidence: f32,
}

impl ClassificationResult {
  pub fn new(label: impl Into<String>, confidence: f32) -> Self {
    Self {
      label: label.into(),
      confidence,
    }
  }
}

/// 原始分数到置信度的变换
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoreActivation {
  #[default]
  Identity,
  Softmax,
  Sigmoid,
}

impl ScoreActivation {
  pub fn apply(&self, scores: &[f32]) -> Vec<f32> {
    match self {
      ScoreActivation::Identity => scores.to_vec(),
      ScoreActivation::Sigmoid => scores.iter().map(|&x| sigmoid(x)).collect(),
      ScoreActivation::Softmax => {
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|&x| (x - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
      }
    }
  }
}

impl FromStr for ScoreActivation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "identity" | "none" => Ok(ScoreActivation::Identity),
      "softmax" => Ok(ScoreActivation::Softmax),
      "sigmoid" => Ok(ScoreActivation::Sigmoid),
      other => Err(format!("未知的激活函数: {}", other)),
    }
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型 URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数 {name} 无效: {value}")]
  InvalidParameter { name: String, value: String },
  #[error("缺少标签配置，请提供 labels= 或 classes= 参数")]
  MissingLabels,
  #[error("标签加载错误: {0}")]
  LabelError(#[from] LabelError),
  #[cfg(feature = "model_onnx")]
  #[error("ONNX 模型加载错误: {0}")]
  OnnxError(#[from] OnnxModelError),
  #[cfg(feature = "model_rknn")]
  #[error("RKNN 模型加载错误: {0}")]
  RknnError(#[from] RknnModelError),
}

/// 单次请求的推理错误，不会影响其他请求
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
  #[error("输入格式错误: {0}")]
  MalformedInput(String),
  #[error("推理引擎错误: {0}")]
  Engine(String),
  #[error("推理引擎崩溃: {0}")]
  Panicked(String),
  #[error("标签数量 {labels} 与模型输出数量 {scores} 不一致")]
  LabelMismatch { labels: usize, scores: usize },
  #[error("类别 {label} 的置信度 {score} 不在 [0, 1] 区间内")]
  InvalidScore { label: String, score: f32 },
  #[error("推理任务在执行前被放弃")]
  Abandoned,
}

/// 读取并解析查询参数，不存在时返回 `None`
pub(crate) fn parse_query<T: FromStr>(url: &Url, name: &str) -> Result<Option<T>, ModelLoadError> {
  match url_query(url, name) {
    None => Ok(None),
    Some(value) => value
      .parse()
      .map(Some)
      .map_err(|_| ModelLoadError::InvalidParameter {
        name: name.to_string(),
        value,
      }),
  }
}

/// 读取输入边长，缺省时取 `default`，为 0 时视为配置错误
pub(crate) fn parse_size(url: &Url, name: &str, default: u32) -> Result<u32, ModelLoadError> {
  match parse_query::<u32>(url, name)? {
    None => Ok(default),
    Some(0) => Err(ModelLoadError::InvalidParameter {
      name: name.to_string(),
      value: "0".to_string(),
    }),
    Some(size) => Ok(size),
  }
}

/// 已加载的模型，加载后不可变，由 [`crate::classifier::Classifier`] 独占
pub struct ModelHandle<M> {
  model: M,
  labels: LabelSet,
  activation: ScoreActivation,
}

impl<M: Model> ModelHandle<M> {
  pub fn new(model: M, labels: LabelSet) -> Self {
    Self {
      model,
      labels,
      activation: ScoreActivation::default(),
    }
  }

  pub fn with_activation(mut self, activation: ScoreActivation) -> Self {
    self.activation = activation;
    self
  }

  pub fn input_spec(&self) -> InputSpec {
    self.model.input_spec()
  }

  pub fn labels(&self) -> &LabelSet {
    &self.labels
  }

  /// 对一帧输入执行推理并映射为带标签的结果（未排序）
  pub fn predict(&self, input: &ModelInput) -> Result<Vec<ClassificationResult>, InferenceError> {
    if input.is_empty() {
      return Err(InferenceError::MalformedInput("输入为空".to_string()));
    }

    let spec = self.model.input_spec();
    if !input.matches(&spec) {
      return Err(InferenceError::MalformedInput(format!(
        "期望 {}x{} {:?}, 实际 {}x{} {:?}",
        spec.width,
        spec.height,
        spec.layout,
        input.width(),
        input.height(),
        input.layout()
      )));
    }

    let scores = self
      .model
      .infer(input)
      .map_err(|e| InferenceError::Engine(e.to_string()))?;
    debug!("模型原始输出: {:?}", scores);

    if scores.is_empty() {
      return Ok(Vec::new());
    }

    if scores.len() != self.labels.len() {
      return Err(InferenceError::LabelMismatch {
        labels: self.labels.len(),
        scores: scores.len(),
      });
    }

    self
      .activation
      .apply(&scores)
      .into_iter()
      .zip(self.labels.iter())
      .map(|(confidence, label)| {
        if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
          Ok(ClassificationResult::new(label, confidence))
        } else {
          Err(InferenceError::InvalidScore {
            label: label.to_string(),
            score: confidence,
          })
        }
      })
      .collect()
  }
}

impl<M> FromUrl for ModelHandle<M>
where
  M: Model + FromUrl,
  ModelLoadError: From<<M as FromUrl>::Error>,
{
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let labels = match (url_query(url, "labels"), url_query(url, "classes")) {
      (Some(path), _) => LabelSet::from_path(path)?,
      (None, Some(list)) => LabelSet::from_list(&list)?,
      (None, None) => return Err(ModelLoadError::MissingLabels),
    };
    let activation = parse_query(url, "activation")?.unwrap_or_default();

    let model = M::from_url(url)?;
    info!(
      "模型加载完成，类别: [{}]，激活函数: {:?}",
      labels.iter().collect::<Vec<_>>().join(", "),
      activation
    );

    Ok(ModelHandle::new(model, labels).with_activation(activation))
  }
}

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{Normalization, OnnxModel, OnnxModelBuilder, OnnxModelError};

#[cfg(feature = "model_rknn")]
mod rknn;
#[cfg(feature = "model_rknn")]
pub use self::rknn::{RknnModel, RknnModelBuilder, RknnModelError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_onnx")]
  #[error("ONNX 推理错误: {0}")]
  OnnxError(#[from] OnnxModelError),
  #[cfg(feature = "model_rknn")]
  #[error("RKNN 推理错误: {0}")]
  RknnError(#[from] RknnModelError),
}

/// 按 URI 方案选择的推理后端
pub enum ModelWrapper {
  #[cfg(feature = "model_onnx")]
  Onnx(OnnxModel),
  #[cfg(feature = "model_rknn")]
  Rknn(RknnModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "model_onnx")]
      OnnxModelBuilder::SCHEME => {
        let model = OnnxModelBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::Onnx(model))
      }
      #[cfg(feature = "model_rknn")]
      RknnModelBuilder::SCHEME => {
        let model = RknnModelBuilder::from_url(url)?.build()?;
        Ok(ModelWrapper::Rknn(model))
      }
      other => Err(ModelLoadError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for ModelWrapper {
  type Error = ModelError;

  // 未启用任何后端时枚举为空，需按值匹配
  fn input_spec(&self) -> InputSpec {
    match *self {
      #[cfg(feature = "model_onnx")]
      ModelWrapper::Onnx(ref model) => model.input_spec(),
      #[cfg(feature = "model_rknn")]
      ModelWrapper::Rknn(ref model) => model.input_spec(),
    }
  }

  fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, Self::Error> {
    match *self {
      #[cfg(feature = "model_onnx")]
      ModelWrapper::Onnx(ref model) => model.infer(input).map_err(ModelError::from),
      #[cfg(feature = "model_rknn")]
      ModelWrapper::Rknn(ref model) => model.infer(input).map_err(ModelError::from),
    }
  }
}
