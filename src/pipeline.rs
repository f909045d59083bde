// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/pipeline.rs - 逐帧检测流水线
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

use std::{path::Path, time::Instant};

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  frame::{AnnotatedFrame, FrameSize},
  input::{FrameStream, VideoDecoder},
  model::Model,
  output::draw::Draw,
};

pub const DEFAULT_MAX_FRAMES: usize = 100;
pub const CONFIDENCE_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("第 {index} 帧推理失败: {source}")]
  Inference {
    index: usize,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// 视频 → 逐帧推理 → 绘制 → 有上限的帧序列
pub struct FramePipeline<D> {
  decoder: D,
  draw: Draw,
}

impl<D: VideoDecoder> FramePipeline<D> {
  pub fn new(decoder: D, draw: Draw) -> Self {
    Self { decoder, draw }
  }

  /// 依次处理视频的前 `max_frames` 帧，返回完整的结果序列。
  ///
  /// 帧尺寸只由模型规格决定。视频无法打开时返回空序列；
  /// 推理失败时返回错误，已处理的帧被丢弃。解码句柄在任何情况下都只打开、释放一次。
  pub fn process<M>(
    &self,
    video: &Path,
    model: &M,
    max_frames: usize,
  ) -> Result<Vec<AnnotatedFrame>, PipelineError>
  where
    M: Model + ?Sized,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let size = model.profile().frame_size();
    info!(
      "开始处理 {}，帧尺寸 {}，最多 {} 帧",
      video.display(),
      size,
      max_frames
    );

    let mut stream = match self.decoder.open(video) {
      Ok(stream) => stream,
      Err(e) => {
        warn!("无法打开视频 {}: {}", video.display(), e);
        return Ok(Vec::new());
      }
    };

    let started = Instant::now();
    let mut frames = Vec::with_capacity(max_frames.min(DEFAULT_MAX_FRAMES));
    while frames.len() < max_frames {
      let Some(raw) = stream.read_next() else {
        debug!("视频读取结束");
        break;
      };

      let index = frames.len();
      let mut image = resize_to(raw, size);
      let result = model
        .infer(&image, CONFIDENCE_THRESHOLD)
        .map_err(|e| PipelineError::Inference {
          index,
          source: Box::new(e),
        })?;
      let overlays = self
        .draw
        .draw_detections(&mut image, &result, model.labels());
      debug!("第 {} 帧: 检测到 {} 个对象", index, overlays.len());

      frames.push(AnnotatedFrame {
        index,
        image,
        overlays: overlays.into_boxed_slice(),
      });
    }
    drop(stream);

    info!(
      "处理完成: {} 帧，耗时 {:.2?}",
      frames.len(),
      started.elapsed()
    );
    Ok(frames)
  }
}

fn resize_to(image: RgbImage, size: FrameSize) -> RgbImage {
  if FrameSize::of(&image) == size {
    return image;
  }
  imageops::resize(&image, size.width, size.height, FilterType::Triangle)
}
