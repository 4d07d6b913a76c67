// 该文件是 Maogou （猫狗） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 记录输出
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
  fs::OpenOptions,
  io::{BufWriter, Write},
  path::Path,
  sync::Mutex,
};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Render, Submitted},
  pipeline::{Outcome, PipelineError},
  url_path,
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出写入器已损坏")]
  Poisoned,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 每个结果写一行 JSON，路径为空时写到标准输出
pub struct JsonLinesOutput {
  writer: Mutex<Box<dyn Write + Send>>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = url_path(uri).unwrap_or_default();
    if path.is_empty() {
      debug!("JSON Lines 输出到标准输出");
      return Ok(Self::from_writer(Box::new(std::io::stdout())));
    }

    if let Some(parent) = Path::new(&path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    warn!("识别结果追加写入文件: {}", path);
    Ok(Self::from_writer(Box::new(BufWriter::new(file))))
  }
}

impl JsonLinesOutput {
  pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
    Self {
      writer: Mutex::new(writer),
    }
  }
}

/// 按 f32 的最短十进制形式输出，与报告中的数值一致
fn confidence_value(confidence: f32) -> f64 {
  format!("{:?}", confidence)
    .parse()
    .unwrap_or(confidence as f64)
}

fn outcome_record(request: &Submitted, outcome: &Outcome) -> Value {
  let timestamp = chrono::Local::now().to_rfc3339();
  match outcome {
    Ok(delivery) => json!({
      "timestamp": timestamp,
      "source": request.source,
      "submission": request.id.get(),
      "status": "delivered",
      "results": delivery
        .results
        .iter()
        .map(|r| json!({ "label": r.label, "confidence": confidence_value(r.confidence) }))
        .collect::<Vec<_>>(),
      "report": delivery.report.lines(),
    }),
    Err(e) => {
      let status = match e {
        PipelineError::Superseded { .. } => "superseded",
        PipelineError::Abandoned => "abandoned",
        _ => "failed",
      };
      json!({
        "timestamp": timestamp,
        "source": request.source,
        "submission": request.id.get(),
        "status": status,
        "error": e.to_string(),
      })
    }
  }
}

impl Render<Outcome> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, request: &Submitted, result: &Outcome) -> Result<(), Self::Error> {
    let record = outcome_record(request, result);
    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
  }
}
