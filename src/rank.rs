// 该文件是 Maogou （猫狗） 项目的一部分。
// src/rank.rs - 分类结果排序
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

use crate::model::ClassificationResult;

/// 按置信度降序排列，置信度相同时保持输入顺序
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultRanker {
  top_k: Option<usize>,
}

impl ResultRanker {
  pub fn new() -> Self {
    Self::default()
  }

  /// 只保留前 `k` 个结果
  pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
    self.top_k = top_k;
    self
  }

  pub fn rank(&self, mut results: Vec<ClassificationResult>) -> Vec<ClassificationResult> {
    // sort_by 是稳定排序
    results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    if let Some(k) = self.top_k {
      results.truncate(k);
    }
    results
  }
}
