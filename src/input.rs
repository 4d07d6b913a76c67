// 该文件是 Maogou （猫狗） 项目的一部分。
// src/input.rs - 照片输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, preprocess::RawImage, url_path};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("路径无效: {0}")]
  InvalidPath(String),
  #[error("读取 {0} 失败: {1}")]
  ReadError(String, std::io::Error),
}

/// 一次拍摄得到的照片
#[derive(Debug, Clone)]
pub struct CapturedImage {
  pub source: String,
  pub raw: RawImage,
}

fn decode_path(url: &Url) -> Result<PathBuf, InputError> {
  url_path(url)
    .filter(|path| !path.is_empty())
    .map(PathBuf::from)
    .ok_or_else(|| InputError::InvalidPath(url.to_string()))
}

/// 只读取文件字节，解码留给预处理，损坏的图片只影响自身的请求
fn read_captured(path: &Path) -> Result<CapturedImage, InputError> {
  let source = path.display().to_string();
  let bytes = std::fs::read(path).map_err(|e| InputError::ReadError(source.clone(), e))?;
  debug!("读取照片 {}，{} 字节", source, bytes.len());
  Ok(CapturedImage {
    source,
    raw: RawImage::Encoded(bytes),
  })
}

/// 单个图片文件
pub struct ImageFileInput {
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(ImageFileInput {
      path: Some(decode_path(url)?),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<CapturedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.path.take().map(|path| read_captured(&path))
  }
}

/// 目录下的所有图片文件，按文件名排序
pub struct DirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let directory = decode_path(url)?;
    let source = directory.display().to_string();
    let entries =
      std::fs::read_dir(&directory).map_err(|e| InputError::ReadError(source.clone(), e))?;

    let mut files: Vec<PathBuf> = entries
      .filter_map(|entry| entry.ok().map(|entry| entry.path()))
      .filter(|path| path.is_file() && is_image_file(path))
      .collect();
    files.sort();
    debug!("目录 {} 中找到 {} 张图片", source, files.len());

    Ok(DirectoryInput {
      files: files.into_iter(),
    })
  }
}

impl Iterator for DirectoryInput {
  type Item = Result<CapturedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.files.next().map(|path| read_captured(&path))
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
    })
    .unwrap_or(false)
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  Directory(DirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      DirectoryInput::SCHEME => Ok(InputWrapper::Directory(DirectoryInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<CapturedImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input.next(),
      InputWrapper::Directory(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("maogou-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn directory_lists_only_images_sorted() {
    let dir = scratch_dir("input-dir");
    std::fs::write(dir.join("b.PNG"), b"b").unwrap();
    std::fs::write(dir.join("a.jpg"), b"a").unwrap();
    std::fs::write(dir.join("notes.txt"), b"skip").unwrap();

    let url = Url::from_directory_path(&dir).unwrap();
    let url = Url::parse(&url.as_str().replacen("file:", "folder:", 1)).unwrap();
    let sources: Vec<String> = InputWrapper::from_url(&url)
      .unwrap()
      .map(|captured| captured.unwrap().source)
      .collect();

    assert_eq!(sources.len(), 2);
    assert!(sources[0].ends_with("a.jpg"));
    assert!(sources[1].ends_with("b.PNG"));

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn missing_file_is_reported_per_image() {
    let url = Url::parse("image:///nonexistent/maogou%20cat.jpg").unwrap();
    let mut input = InputWrapper::from_url(&url).unwrap();
    match input.next() {
      Some(Err(InputError::ReadError(source, _))) => {
        assert_eq!(source, "/nonexistent/maogou cat.jpg")
      }
      other => panic!("unexpected: {:?}", other.map(|r| r.map(|c| c.source))),
    }
    assert!(input.next().is_none());
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("v4l2:///dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }
}
