// 该文件是 Maogou （猫狗） 项目的一部分。
// src/report.rs - 识别结果文本报告
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

use std::fmt;

use crate::model::ClassificationResult;

/// 展示用的报告，每个结果一行
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedReport {
  lines: Vec<String>,
}

impl FormattedReport {
  pub fn lines(&self) -> &[String] {
    &self.lines
  }

  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }

  pub fn len(&self) -> usize {
    self.lines.len()
  }

  pub fn into_lines(self) -> Vec<String> {
    self.lines
  }
}

impl fmt::Display for FormattedReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.lines.join("\n"))
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultFormatter;

impl ResultFormatter {
  pub fn format(&self, ranked: &[ClassificationResult]) -> FormattedReport {
    let lines = ranked
      .iter()
      .map(|result| {
        // {:?} 输出最短可还原的十进制表示，且保留 "1.0" 这样的小数点
        format!(
          "{}, confidence: {:?}",
          capitalize_words(&result.label),
          result.confidence
        )
      })
      .collect();
    FormattedReport { lines }
  }
}

/// 每个单词首字母大写、其余小写
pub fn capitalize_words(text: &str) -> String {
  let mut output = String::with_capacity(text.len());
  let mut at_word_start = true;
  for c in text.chars() {
    if c.is_whitespace() {
      at_word_start = true;
      output.push(c);
    } else if at_word_start {
      at_word_start = false;
      output.extend(c.to_uppercase());
    } else {
      output.extend(c.to_lowercase());
    }
  }
  output
}
