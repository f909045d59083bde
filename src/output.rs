// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::frame::AnnotatedFrame;

pub trait Render: Sized {
  type Error;
  fn render_frame(&self, frame: &AnnotatedFrame) -> Result<(), Self::Error>;
  fn finish(&self) -> Result<(), Self::Error>;
}

pub mod draw;

mod directory_record;
pub use self::directory_record::DirectoryRecordOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("无法加载字体: {0}")]
  InvalidFont(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 编码为 PNG 字节，用于网页内嵌显示
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, OutputError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png)?;
  Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn png_signature() {
    let bytes = encode_png(&RgbImage::new(3, 2)).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (3, 2));
  }
}
