// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/input/image_sequence.rs - 图像序列输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::input::{FrameStream, VideoDecoder};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageSequenceError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("No such image or directory: {0}")]
  NotFound(PathBuf),
}

/// 把单张图像或目录中的图像（按文件名排序）当作视频读取
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSequenceDecoder;

impl ImageSequenceDecoder {
  pub fn is_image_file(path: &Path) -> bool {
    path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| {
        IMAGE_EXTENSIONS
          .iter()
          .any(|known| ext.eq_ignore_ascii_case(known))
      })
  }
}

impl VideoDecoder for ImageSequenceDecoder {
  type Stream = ImageSequence;
  type Error = ImageSequenceError;

  fn open(&self, path: &Path) -> Result<Self::Stream, Self::Error> {
    let frames = if path.is_dir() {
      let mut frames = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.is_file() && Self::is_image_file(&entry_path) {
          frames.push(entry_path);
        }
      }
      frames.sort();
      frames
    } else if path.is_file() {
      vec![path.to_path_buf()]
    } else {
      return Err(ImageSequenceError::NotFound(path.to_path_buf()));
    };

    info!("打开图像序列 {}: {} 帧", path.display(), frames.len());
    Ok(ImageSequence {
      source: path.to_path_buf(),
      frames: frames.into(),
    })
  }
}

pub struct ImageSequence {
  source: PathBuf,
  frames: VecDeque<PathBuf>,
}

impl FrameStream for ImageSequence {
  fn read_next(&mut self) -> Option<RgbImage> {
    let path = self.frames.pop_front()?;
    let decoded = ImageReader::open(&path)
      .map_err(image::ImageError::IoError)
      .and_then(|reader| reader.with_guessed_format().map_err(image::ImageError::IoError))
      .and_then(|reader| reader.decode());

    match decoded {
      Ok(image) => Some(image.into_rgb8()),
      Err(e) => {
        warn!("无法解码 {}: {}，结束读取", path.display(), e);
        self.frames.clear();
        None
      }
    }
  }
}

impl Drop for ImageSequence {
  fn drop(&mut self) {
    debug!("关闭图像序列 {}", self.source.display());
  }
}
