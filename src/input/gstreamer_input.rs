// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频文件输入
//!
//! 使用 `filesrc ! decodebin ! videoconvert ! appsink` 管道逐帧解码本地视频文件，
//! 输出 RGB 图像。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-libav
//! ```
//!
//! **macOS:**
//! ```bash
//! brew install gstreamer
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use std::path::Path;
//! use lankuang::input::{FrameStream, GStreamerDecoder, VideoDecoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut stream = GStreamerDecoder::default().open(Path::new("game.mp4"))?;
//! while let Some(frame) = stream.read_next() {
//!     println!("帧: {}x{}", frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! 管道在 `GStreamerStream` 被丢弃时切换到 `Null` 状态并释放。

use std::{
  path::Path,
  time::{Duration, Instant},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::input::{FrameStream, VideoDecoder};

const PULL_INTERVAL_MS: u64 = 100;
const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("GStreamer 错误: {0}")]
  GlibError(#[from] gst::glib::Error),
  #[error("管道状态切换失败: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("管道中没有名为 sink 的 appsink")]
  MissingAppSink,
  #[error("无法解析帧格式")]
  VideoInfoError,
  #[error("帧格式不是 RGB")]
  UnsupportedFormat,
  #[error("帧数据不足: 需要 {expected} 字节，实际 {actual} 字节")]
  ShortBuffer { expected: usize, actual: usize },
  #[error("无效的帧: {0}")]
  InvalidSample(&'static str),
  #[error("管道创建失败")]
  NotAPipeline,
  #[error("视频文件不存在: {0}")]
  NotFound(String),
}

/// 基于 GStreamer 的视频文件解码器
pub struct GStreamerDecoder {
  stall_timeout: Duration,
}

impl Default for GStreamerDecoder {
  fn default() -> Self {
    Self {
      stall_timeout: DEFAULT_STALL_TIMEOUT,
    }
  }
}

impl GStreamerDecoder {
  /// 超过该时间没有新帧即视为结束
  pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
    self.stall_timeout = stall_timeout;
    self
  }

  fn pipeline_description(path: &Path) -> String {
    let location = path
      .to_string_lossy()
      .replace('\\', "\\\\")
      .replace('"', "\\\"");
    format!(
      "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
       appsink name=sink sync=false max-buffers=4",
      location
    )
  }
}

impl VideoDecoder for GStreamerDecoder {
  type Stream = GStreamerStream;
  type Error = GStreamerInputError;

  fn open(&self, path: &Path) -> Result<Self::Stream, Self::Error> {
    if !path.is_file() {
      return Err(GStreamerInputError::NotFound(path.display().to_string()));
    }

    gst::init()?;

    let description = Self::pipeline_description(path);
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::NotAPipeline)?;

    let appsink = pipeline
      .by_name("sink")
      .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
      .ok_or(GStreamerInputError::MissingAppSink)?;

    // 先构造句柄，启动失败时同样由 Drop 释放管道
    let stream = GStreamerStream {
      pipeline,
      appsink,
      stall_timeout: self.stall_timeout,
      finished: false,
      frame_count: 0,
    };
    stream.pipeline.set_state(gst::State::Playing)?;

    Ok(stream)
  }
}

/// 已打开的 GStreamer 管道
pub struct GStreamerStream {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  stall_timeout: Duration,
  finished: bool,
  frame_count: u64,
}

impl Drop for GStreamerStream {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止 GStreamer 管道: {}", e);
    }
    debug!("GStreamer 管道已关闭，共读取 {} 帧", self.frame_count);
  }
}

impl GStreamerStream {
  /// 管道报告错误时返回 true
  fn check_bus(&self) -> bool {
    let Some(bus) = self.pipeline.bus() else {
      return false;
    };
    while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
      if let gst::MessageView::Error(err) = msg.view() {
        error!(
          "GStreamer 错误 {:?}: {} ({:?})",
          err.src().map(|s| s.path_string()),
          err.error(),
          err.debug()
        );
        return true;
      }
    }
    false
  }

  fn pull_sample(&mut self) -> Option<gst::Sample> {
    if self.finished {
      return None;
    }

    let started = Instant::now();
    loop {
      if let Some(sample) = self
        .appsink
        .try_pull_sample(gst::ClockTime::from_mseconds(PULL_INTERVAL_MS))
      {
        return Some(sample);
      }
      if self.appsink.is_eos() {
        debug!("GStreamer 输入结束");
        break;
      }
      if self.check_bus() {
        break;
      }
      if started.elapsed() > self.stall_timeout {
        warn!("超过 {:?} 没有新帧，结束读取", self.stall_timeout);
        break;
      }
    }

    self.finished = true;
    None
  }
}

impl FrameStream for GStreamerStream {
  fn read_next(&mut self) -> Option<RgbImage> {
    let sample = self.pull_sample()?;
    match convert_sample_to_rgb(&sample) {
      Ok(image) => {
        self.frame_count += 1;
        Some(image)
      }
      Err(e) => {
        error!("无法转换帧: {}，结束读取", e);
        self.finished = true;
        None
      }
    }
  }
}

fn convert_sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or(GStreamerInputError::InvalidSample("缺少缓冲区"))?;
  let caps = sample
    .caps()
    .ok_or(GStreamerInputError::InvalidSample("缺少 caps"))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width * 3;

  let map = buffer
    .map_readable()
    .map_err(|_| GStreamerInputError::InvalidSample("缓冲区不可读"))?;
  let data = map.as_slice();

  // 最后一行不一定带有行尾填充
  let expected_size = stride * height.saturating_sub(1) + row_bytes;
  if data.len() < expected_size {
    return Err(GStreamerInputError::ShortBuffer {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  for row in 0..height {
    let start = row * stride;
    pixels.extend_from_slice(&data[start..start + row_bytes]);
  }

  RgbImage::from_raw(width as u32, height as u32, pixels)
    .ok_or(GStreamerInputError::InvalidSample("尺寸与数据不符"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pipeline_quotes_location() {
    let description = GStreamerDecoder::pipeline_description(Path::new("/tmp/my \"game\".mp4"));
    assert!(description.starts_with("filesrc location=\"/tmp/my \\\"game\\\".mp4\" ! decodebin"));
    assert!(description.contains("format=RGB"));
    assert!(description.ends_with("max-buffers=4"));
  }

  #[test]
  fn missing_file_is_not_opened() {
    let err = GStreamerDecoder::default()
      .open(Path::new("/definitely/not/here.mp4"))
      .err()
      .unwrap();
    assert!(matches!(err, GStreamerInputError::NotFound(_)));
  }
}
