// 该文件是 Maogou （猫狗） 项目的一部分。
// src/model/rknn.rs - RKNN NPU 分类模型
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

use std::sync::Mutex;

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, InputSpec, ModelInput, TensorLayout},
  model::{Model, ModelLoadError, parse_size},
  url_path,
};

const RKNN_SCHEME: &str = "rknn";
const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_DEFAULT_INPUT_SIZE: u32 = 224;

#[derive(Error, Debug)]
pub enum RknnModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("输入排布不匹配，RKNN 模型需要 NHWC 输入")]
  LayoutMismatch,
  #[error("推理上下文不可用")]
  ContextPoisoned,
}

impl RknnModelError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnModelError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnModelBuilder {
  model_path: String,
  width: u32,
  height: u32,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnModelBuilder {
  const SCHEME: &'static str = RKNN_SCHEME;
}

impl FromUrl for RknnModelBuilder {
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

    Ok(RknnModelBuilder {
      model_path,
      width: parse_size(url, "width", RKNN_DEFAULT_INPUT_SIZE)?,
      height: parse_size(url, "height", RKNN_DEFAULT_INPUT_SIZE)?,
      flags: InitFlags::default(),
    })
  }
}

impl RknnModelBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnModel, RknnModelError> {
    info!("加载模型文件: {}", self.model_path);
    let mode_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&mode_data, self.flags)?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(RknnModelError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnModelError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnModelError::invalid("无法获取输出数量", e))?;

    if num_inputs != RKNN_NUM_INPUTS || num_outputs == 0 {
      error!(
        "预期模型输入数量为 {}、至少一个输出, 实际为 {} / {}",
        RKNN_NUM_INPUTS, num_inputs, num_outputs
      );
      return Err(RknnModelError::invalid(
        &format!("模型输入/输出数量不符: {} / {}", num_inputs, num_outputs),
        rknpu::Error::InvalidModel,
      ));
    }
    info!("模型加载完成");

    Ok(RknnModel {
      context: Mutex::new(context),
      spec: InputSpec::new(self.width, self.height, TensorLayout::Nhwc),
    })
  }
}

/// NPU 上下文不可重入，推理按请求串行执行
pub struct RknnModel {
  context: Mutex<Context>,
  spec: InputSpec,
}

impl Model for RknnModel {
  type Error = RknnModelError;

  fn input_spec(&self) -> InputSpec {
    self.spec
  }

  fn infer(&self, input: &ModelInput) -> Result<Vec<f32>, Self::Error> {
    let ModelInput::Nhwc(frame) = input else {
      return Err(RknnModelError::LayoutMismatch);
    };

    let context = self
      .context
      .lock()
      .map_err(|_| RknnModelError::ContextPoisoned)?;

    debug!("设置模型输入");
    context.set_input(0, frame.as_nhwc(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    context.run()?;

    let output = context.get_outputs()?;
    let scores = output.get_f32(0)?;
    Ok(scores.to_vec())
  }
}
