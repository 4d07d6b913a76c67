// 该文件是 Maogou （猫狗） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;
use url::Url;

use maogou::{pipeline::StalePolicy, preprocess::ResizeMode};

/// Maogou 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// 支持格式:
  /// - onnx:///path/model.onnx?classes=cat,dog&width=224&height=224
  /// - rknn:///path/model.rknn?labels=/path/labels.txt（需启用 model_rknn）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源，可重复指定
  /// 支持格式:
  /// - 图片: image:///path/photo.jpg
  /// - 目录: folder:///path/photos
  #[arg(long, value_name = "SOURCE", required = true)]
  pub input: Vec<Url>,

  /// 输出方式
  /// 支持格式:
  /// - 控制台: console:
  /// - JSON Lines: jsonl:///path/results.jsonl（路径为空时写到标准输出）
  #[arg(long, value_name = "OUTPUT", default_value = "console:")]
  pub output: Url,

  /// 推理线程数
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub workers: usize,

  /// 旧请求的处理方式 (latest-wins, deliver-all)
  #[arg(long, default_value = "deliver-all", value_name = "POLICY")]
  pub stale_policy: StalePolicy,

  /// 缩放方式 (center-crop, stretch, letterbox)
  #[arg(long, default_value = "center-crop", value_name = "MODE")]
  pub resize: ResizeMode,

  /// 只显示置信度最高的前 K 个结果
  #[arg(long, value_name = "K")]
  pub top_k: Option<usize>,
}
