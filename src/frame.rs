// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/frame.rs - 帧与标注定义
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
use serde::Serialize;

/// 帧尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameSize {
  pub width: u32,
  pub height: u32,
}

impl FrameSize {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn of(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self { width, height }
  }
}

impl std::fmt::Display for FrameSize {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

/// 单个检测结果在帧上绘制的内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overlay {
  pub bbox: [i32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
  pub label: String,
}

/// 已完成推理与绘制的帧
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
  pub index: usize,
  pub image: RgbImage,
  pub overlays: Box<[Overlay]>,
}

impl AnnotatedFrame {
  pub fn size(&self) -> FrameSize {
    FrameSize::of(&self.image)
  }

  pub fn detection_count(&self) -> usize {
    self.overlays.len()
  }
}
