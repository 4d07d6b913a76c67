// 该文件是 Maogou （猫狗） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use image::{DynamicImage, RgbImage, imageops, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::{InputSpec, ModelInput};

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("图像数据为空")]
  EmptyImage,
  #[error("图像尺寸无效: {0}x{1}")]
  InvalidDimensions(u32, u32),
  #[error("图像解码错误: {0}")]
  DecodeError(#[from] image::ImageError),
}

/// 采集到的原始照片
#[derive(Debug, Clone)]
pub enum RawImage {
  /// 编码后的字节（JPEG、PNG 等），格式由内容判断
  Encoded(Vec<u8>),
  /// 已解码的位图
  Decoded(DynamicImage),
}

impl From<Vec<u8>> for RawImage {
  fn from(bytes: Vec<u8>) -> Self {
    RawImage::Encoded(bytes)
  }
}

impl From<DynamicImage> for RawImage {
  fn from(image: DynamicImage) -> Self {
    RawImage::Decoded(image)
  }
}

impl From<RgbImage> for RawImage {
  fn from(image: RgbImage) -> Self {
    RawImage::Decoded(DynamicImage::ImageRgb8(image))
  }
}

/// 缩放到模型输入尺寸的方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResizeMode {
  /// 等比缩放至铺满后裁剪中心区域
  #[default]
  CenterCrop,
  /// 直接拉伸
  Stretch,
  /// 等比缩放后居中，四周补黑边
  Letterbox,
}

impl FromStr for ResizeMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "center-crop" => Ok(ResizeMode::CenterCrop),
      "stretch" => Ok(ResizeMode::Stretch),
      "letterbox" => Ok(ResizeMode::Letterbox),
      other => Err(format!("未知的缩放方式: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
  spec: InputSpec,
  resize: ResizeMode,
  filter: FilterType,
}

impl ImagePreprocessor {
  pub fn new(spec: InputSpec) -> Self {
    Self {
      spec,
      resize: ResizeMode::default(),
      filter: FilterType::Triangle,
    }
  }

  pub fn with_resize(mut self, resize: ResizeMode) -> Self {
    self.resize = resize;
    self
  }

  pub fn spec(&self) -> InputSpec {
    self.spec
  }

  /// 解码、缩放并转换为模型需要的排布
  pub fn prepare(&self, raw: RawImage) -> Result<ModelInput, PreprocessError> {
    let image = match raw {
      RawImage::Encoded(bytes) => {
        if bytes.is_empty() {
          return Err(PreprocessError::EmptyImage);
        }
        image::load_from_memory(&bytes)?
      }
      RawImage::Decoded(image) => image,
    };

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(PreprocessError::InvalidDimensions(width, height));
    }
    debug!(
      "原始图像 {}x{} -> 模型输入 {}x{} ({:?})",
      width, height, self.spec.width, self.spec.height, self.resize
    );

    let resized = self.resize(&image);
    Ok(ModelInput::from_image(&resized, self.spec.layout))
  }

  fn resize(&self, image: &DynamicImage) -> RgbImage {
    let (width, height) = (self.spec.width, self.spec.height);
    if image.width() == width && image.height() == height {
      return image.to_rgb8();
    }

    match self.resize {
      ResizeMode::Stretch => image.resize_exact(width, height, self.filter).to_rgb8(),
      ResizeMode::CenterCrop => image.resize_to_fill(width, height, self.filter).to_rgb8(),
      ResizeMode::Letterbox => {
        let scaled = image.resize(width, height, self.filter).to_rgb8();
        let mut canvas = RgbImage::new(width, height);
        let x_offset = (width - scaled.width()) / 2;
        let y_offset = (height - scaled.height()) / 2;
        imageops::overlay(&mut canvas, &scaled, x_offset as i64, y_offset as i64);
        canvas
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::TensorLayout;
  use image::{ImageFormat, Rgb};
  use std::io::Cursor;

  fn red_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([255, 0, 0]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    bytes
  }

  fn preprocessor(layout: TensorLayout) -> ImagePreprocessor {
    ImagePreprocessor::new(InputSpec::new(8, 8, layout))
  }

  #[test]
  fn encoded_image_is_resized_to_model_input() {
    let input = preprocessor(TensorLayout::Nchw)
      .prepare(RawImage::Encoded(red_png(20, 10)))
      .unwrap();
    assert!(input.matches(&InputSpec::new(8, 8, TensorLayout::Nchw)));
    // 红色通道平面在前
    assert!(input.as_bytes()[..64].iter().all(|&v| v > 250));
    assert!(input.as_bytes()[64..].iter().all(|&v| v < 5));
  }

  #[test]
  fn corrupt_bytes_fail_to_decode() {
    let result =
      preprocessor(TensorLayout::Nhwc).prepare(RawImage::Encoded(vec![0xde, 0xad, 0xbe, 0xef]));
    assert!(matches!(result, Err(PreprocessError::DecodeError(_))));
  }

  #[test]
  fn empty_bytes_are_rejected() {
    let result = preprocessor(TensorLayout::Nhwc).prepare(RawImage::Encoded(Vec::new()));
    assert!(matches!(result, Err(PreprocessError::EmptyImage)));
  }

  #[test]
  fn zero_sized_bitmap_is_rejected() {
    let result = preprocessor(TensorLayout::Nhwc).prepare(RgbImage::new(0, 4).into());
    assert!(matches!(
      result,
      Err(PreprocessError::InvalidDimensions(0, 4))
    ));
  }

  #[test]
  fn letterbox_pads_with_black() {
    let wide = RgbImage::from_pixel(16, 4, Rgb([255, 255, 255]));
    let input = preprocessor(TensorLayout::Nhwc)
      .with_resize(ResizeMode::Letterbox)
      .prepare(wide.into())
      .unwrap();
    let bytes = input.as_bytes();
    // 第一行是补边，中间一行是图像
    assert_eq!(&bytes[..3], &[0, 0, 0]);
    let middle = 4 * 8 * 3;
    assert!(bytes[middle..middle + 3].iter().all(|&v| v > 250));
  }
}
