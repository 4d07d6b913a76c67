// 该文件是 Maogou （猫狗） 项目的一部分。
// src/model/onnx.rs - ONNX 分类模型（tract 后端）
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
use tract_onnx::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNchwFrame, InputSpec, ModelInput, TensorLayout},
  model::{Model, ModelLoadError, parse_query, parse_size},
  url_path,
};

const ONNX_SCHEME: &str = "onnx";
const ONNX_DEFAULT_INPUT_SIZE: u32 = 224;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("tract 错误: {0}")]
  TractError(String),
  #[error("模型没有输出")]
  NoOutput,
  #[error("输入排布不匹配，ONNX 模型需要 NCHW 输入")]
  LayoutMismatch,
}

impl OnnxModelError {
  fn tract(err: TractError) -> Self {
    OnnxModelError::TractError(format!("{:#}", err))
  }
}

/// 像素归一化方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Normalization {
  /// 缩放到 [0, 1]
  #[default]
  Unit,
  /// 缩放到 [0, 1] 后按 ImageNet 均值方差标准化
  ImageNet,
}

impl FromStr for Normalization {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "unit" => Ok(Normalization::Unit),
      "imagenet" => Ok(Normalization::ImageNet),
      other => Err(format!("未知的归一化方式: {}", other)),
    }
  }
}

impl Normalization {
  fn apply(&self, channel: usize, value: u8) -> f32 {
    let value = value as f32 / 255.0;
    match self {
      Normalization::Unit => value,
      Normalization::ImageNet => (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
    }
  }
}

pub struct OnnxModelBuilder {
  model_path: String,
  width: u32,
  height: u32,
  normalization: Normalization,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl FromUrl for OnnxModelBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let model_path = url_path(url).ok_or_else(|| ModelLoadError::InvalidParameter {
      name: "path".to_string(),
      value: url.path().to_string(),
    })?;

    Ok(OnnxModelBuilder {
      model_path,
      width: parse_size(url, "width", ONNX_DEFAULT_INPUT_SIZE)?,
      height: parse_size(url, "height", ONNX_DEFAULT_INPUT_SIZE)?,
      normalization: parse_query(url, "normalize")?.unwrap_or_default(),
    })
  }
}

impl OnnxModelBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      width: ONNX_DEFAULT_INPUT_SIZE,
      height: ONNX_DEFAULT_INPUT_SIZE,
      normalization: Normalization::default(),
    }
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  pub fn normalization(mut self, normalization: Normalization) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn build(self) -> Result<OnnxModel, OnnxModelError> {
    if !std::path::Path::new(&self.model_path).is_file() {
      return Err(OnnxModelError::ModelPathError(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path);
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .and_then(|model| {
        model.with_input_fact(
          0,
          f32::fact([1, 3, self.height as usize, self.width as usize]).into(),
        )
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(OnnxModelError::tract)?;
    debug!(
      "模型输入: 1x3x{}x{}, 归一化: {:?}",
      self.height, self.width, self.normalization
    );

    Ok(OnnxModel {
      plan,
      spec: InputSpec::new(self.width, self.height, TensorLayout::Nchw),
      normalization: self.normalization,
    })
  }
}

pub struct OnnxModel {
  plan: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
  spec: InputSpec,
  normalization: Normalization,
}

impl OnnxModel {
  fn to_tensor(&self, pixels: &[u8]) -> Result<Tensor, OnnxModelError> {
    let height = self.spec.height as usize;
    let width = self.spec.width as usize;
    let plane = height * width;

    let data: Vec<f32> = pixels
      .iter()
      .enumerate()
      .map(|(index, &value)| self.normalization.apply(index / plane, value))
      .collect();

    Tensor::from_shape(&[1, 3, height, width], &data).map_err(OnnxModelError::tract)
  }
}

impl Model for OnnxModel {
  type Error = OnnxModelError;

  fn input_spec(&self) -> InputSpec {
    self.spec
  }

  fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, Self::Error> {
    let ModelInput::Nchw(frame) = input else {
      return Err(OnnxModelError::LayoutMismatch);
    };

    let tensor = self.to_tensor(frame.as_nchw())?;
    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(OnnxModelError::tract)?;

    let output = outputs.first().ok_or(OnnxModelError::NoOutput)?;
    let scores = output
      .to_array_view::<f32>()
      .map_err(OnnxModelError::tract)?;
    Ok(scores.iter().copied().collect())
  }
}
