// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/input.rs - 视频输入
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

use image::RgbImage;
use thiserror::Error;

/// 已打开的解码句柄，`Drop` 时释放
pub trait FrameStream {
  /// 读取下一帧，解码失败或到达结尾时返回 `None`
  fn read_next(&mut self) -> Option<RgbImage>;
}

pub trait VideoDecoder {
  type Stream: FrameStream;
  type Error: std::error::Error + Send + Sync + 'static;

  fn open(&self, path: &Path) -> Result<Self::Stream, Self::Error>;
}

mod image_sequence;
pub use self::image_sequence::{ImageSequence, ImageSequenceDecoder, ImageSequenceError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerDecoder, GStreamerInputError, GStreamerStream};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image sequence input error: {0}")]
  ImageSequenceError(#[from] ImageSequenceError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("Unsupported video source: {0}")]
  Unsupported(String),
}

/// 按路径选择解码器：目录与图像文件按图像序列读取，其余交给 GStreamer
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyDecoder;

pub enum AnyStream {
  ImageSequence(ImageSequence),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerStream),
}

impl FrameStream for AnyStream {
  fn read_next(&mut self) -> Option<RgbImage> {
    match self {
      AnyStream::ImageSequence(stream) => stream.read_next(),
      #[cfg(feature = "gstreamer_input")]
      AnyStream::GStreamer(stream) => stream.read_next(),
    }
  }
}

impl VideoDecoder for AnyDecoder {
  type Stream = AnyStream;
  type Error = InputError;

  fn open(&self, path: &Path) -> Result<Self::Stream, Self::Error> {
    if path.is_dir() || ImageSequenceDecoder::is_image_file(path) {
      let stream = ImageSequenceDecoder.open(path)?;
      return Ok(AnyStream::ImageSequence(stream));
    }

    #[cfg(feature = "gstreamer_input")]
    {
      let stream = GStreamerDecoder::default().open(path)?;
      Ok(AnyStream::GStreamer(stream))
    }

    #[cfg(not(feature = "gstreamer_input"))]
    Err(InputError::Unsupported(path.display().to_string()))
  }
}
