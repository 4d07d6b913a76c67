// 该文件是 Maogou （猫狗） 项目的一部分。
// src/frame.rs - 模型输入帧定义
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

use image::RgbImage;

pub const RGB_CHANNELS: usize = 3;

pub trait AsNchwFrame {
  fn as_nchw(&self) -> &[u8];
}

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 张量排布
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  Nchw,
  Nhwc,
}

/// 模型对输入的要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
  pub width: u32,
  pub height: u32,
  pub layout: TensorLayout,
}

impl InputSpec {
  pub fn new(width: u32, height: u32, layout: TensorLayout) -> Self {
    Self {
      width,
      height,
      layout,
    }
  }

  pub fn byte_len(&self) -> usize {
    RGB_CHANNELS * self.width as usize * self.height as usize
  }
}

#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  data: Box<[u8]>,
  height: usize,
  width: usize,
}

impl RgbNchwFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0u8; RGB_CHANNELS * height * width].into_boxed_slice();
    Self {
      data,
      height,
      width,
    }
  }

  /// 由原始数据构造，长度不匹配时返回 `None`
  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Option<Self> {
    if data.len() != RGB_CHANNELS * height * width {
      return None;
    }
    Some(Self {
      data: data.into_boxed_slice(),
      height,
      width,
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl AsMut<[u8]> for RgbNchwFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl AsNchwFrame for RgbNchwFrame {
  fn as_nchw(&self) -> &[u8] {
    &self.data
  }
}

impl From<&RgbImage> for RgbNchwFrame {
  fn from(image: &RgbImage) -> Self {
    let mut frame = {
      let (width, height) = image.dimensions();
      RgbNchwFrame::with_shape(height as usize, width as usize)
    };

    let channels = frame.channels();
    let height = frame.height();
    let width = frame.width();
    let slice = frame.as_mut();

    for c in 0..channels {
      for h in 0..height {
        for w in 0..width {
          let pixel = image.get_pixel(w as u32, h as u32);
          slice[c * height * width + h * width + w] = pixel[c];
        }
      }
    }
    frame
  }
}

#[derive(Debug, Clone)]
pub struct RgbNhwcFrame {
  data: Box<[u8]>,
  height: usize,
  width: usize,
}

impl RgbNhwcFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0u8; RGB_CHANNELS * height * width].into_boxed_slice();
    Self {
      data,
      height,
      width,
    }
  }

  /// 由原始数据构造，长度不匹配时返回 `None`
  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Option<Self> {
    if data.len() != RGB_CHANNELS * height * width {
      return None;
    }
    Some(Self {
      data: data.into_boxed_slice(),
      height,
      width,
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl AsMut<[u8]> for RgbNhwcFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

impl From<&RgbImage> for RgbNhwcFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    // RgbImage 本身即为 HWC 排布
    Self {
      data: image.as_raw().clone().into_boxed_slice(),
      height: height as usize,
      width: width as usize,
    }
  }
}

/// 送入模型的输入，生命周期仅限一次请求
#[derive(Debug, Clone)]
pub enum ModelInput {
  Nchw(RgbNchwFrame),
  Nhwc(RgbNhwcFrame),
}

impl ModelInput {
  pub fn from_image(image: &RgbImage, layout: TensorLayout) -> Self {
    match layout {
      TensorLayout::Nchw => ModelInput::Nchw(RgbNchwFrame::from(image)),
      TensorLayout::Nhwc => ModelInput::Nhwc(RgbNhwcFrame::from(image)),
    }
  }

  pub fn layout(&self) -> TensorLayout {
    match self {
      ModelInput::Nchw(_) => TensorLayout::Nchw,
      ModelInput::Nhwc(_) => TensorLayout::Nhwc,
    }
  }

  pub fn width(&self) -> usize {
    match self {
      ModelInput::Nchw(frame) => frame.width(),
      ModelInput::Nhwc(frame) => frame.width(),
    }
  }

  pub fn height(&self) -> usize {
    match self {
      ModelInput::Nchw(frame) => frame.height(),
      ModelInput::Nhwc(frame) => frame.height(),
    }
  }

  pub fn as_bytes(&self) -> &[u8] {
    match self {
      ModelInput::Nchw(frame) => frame.as_nchw(),
      ModelInput::Nhwc(frame) => frame.as_nhwc(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.as_bytes().is_empty()
  }

  /// 是否符合模型声明的尺寸与排布
  pub fn matches(&self, spec: &InputSpec) -> bool {
    self.layout() == spec.layout
      && self.width() == spec.width as usize
      && self.height() == spec.height as usize
      && self.as_bytes().len() == spec.byte_len()
  }
}
