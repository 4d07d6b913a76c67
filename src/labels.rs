// 该文件是 Maogou （猫狗） 项目的一部分。
// src/labels.rs - 类别标签表
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

use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标签表为空")]
  Empty,
}

/// 模型输出下标到类别名称的映射，加载后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
  labels: Box<[String]>,
}

impl LabelSet {
  pub fn from_names<I, S>(names: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let labels: Vec<String> = names
      .into_iter()
      .map(Into::into)
      .map(|name| name.trim().to_string())
      .filter(|name| !name.is_empty())
      .collect();
    if labels.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self {
      labels: labels.into_boxed_slice(),
    })
  }

  /// 逗号分隔的内联列表，例如 `cat,dog`
  pub fn from_list(list: &str) -> Result<Self, LabelError> {
    Self::from_names(list.split(','))
  }

  /// `.json` 文件按字符串数组解析，其余按每行一个标签解析
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let is_json = path
      .extension()
      .map(|ext| ext.eq_ignore_ascii_case("json"))
      .unwrap_or(false);

    let labels = if is_json {
      let names: Vec<String> = serde_json::from_str(&content)?;
      Self::from_names(names)?
    } else {
      Self::from_names(content.lines())?
    };
    debug!("从 {} 加载 {} 个标签", path.display(), labels.len());
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}
