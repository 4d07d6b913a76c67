// 该文件是 Maogou （猫狗） 项目的一部分。
// src/output.rs - 识别结果输出
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  pipeline::{Outcome, SubmissionId},
};

/// 结果所属的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
  pub id: SubmissionId,
  pub source: String,
}

pub trait Render<Output>: Sized {
  type Error;
  fn render_result(&self, request: &Submitted, result: &Output) -> Result<(), Self::Error>;
}

mod console;
pub use self::console::{ConsoleOutput, ConsoleOutputError};

mod json_lines;
pub use self::json_lines::{JsonLinesOutput, JsonLinesOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("控制台输出错误: {0}")]
  ConsoleOutputError(#[from] ConsoleOutputError),
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  ConsoleOutput(ConsoleOutput),
  JsonLinesOutput(JsonLinesOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => {
        let output = ConsoleOutput::from_url(url)?;
        Ok(OutputWrapper::ConsoleOutput(output))
      }
      JsonLinesOutput::SCHEME => {
        let output = JsonLinesOutput::from_url(url)?;
        Ok(OutputWrapper::JsonLinesOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<Outcome> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, request: &Submitted, result: &Outcome) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::ConsoleOutput(output) => output
        .render_result(request, result)
        .map_err(OutputError::from),
      OutputWrapper::JsonLinesOutput(output) => output
        .render_result(request, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scheme_selects_output() {
    let console = OutputWrapper::from_url(&Url::parse("console:").unwrap()).unwrap();
    assert!(matches!(console, OutputWrapper::ConsoleOutput(_)));

    let stdout = OutputWrapper::from_url(&Url::parse("jsonl:").unwrap()).unwrap();
    assert!(matches!(stdout, OutputWrapper::JsonLinesOutput(_)));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let result = OutputWrapper::from_url(&Url::parse("rtsp://localhost/live").unwrap());
    assert!(matches!(result, Err(OutputError::SchemeMismatch(s)) if s == "rtsp"));
  }
}
