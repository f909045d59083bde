// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/model.rs - 模型
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

use std::{path::Path, sync::Arc};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::ModelEntry, frame::FrameSize};

/// 检测模型
///
/// `infer` 只返回置信度不低于 `confidence` 的检测结果，调用方不会再次过滤。
pub trait Model {
  type Error;

  fn infer(&self, input: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error>;
  fn labels(&self) -> &Labels;
  fn profile(&self) -> ModelProfile;
}

/// 模型的输入规格，加载时随模型一起确定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelProfile {
  /// 640x360 帧
  #[default]
  Standard,
  /// 1280x1280 帧，对应 P6 结构的模型
  HighRes,
}

impl ModelProfile {
  /// 送入流水线的帧尺寸
  pub const fn frame_size(self) -> FrameSize {
    match self {
      ModelProfile::Standard => FrameSize::new(640, 360),
      ModelProfile::HighRes => FrameSize::new(1280, 1280),
    }
  }

  /// 网络的方形输入边长
  pub const fn input_size(self) -> u32 {
    match self {
      ModelProfile::Standard => 640,
      ModelProfile::HighRes => 1280,
    }
  }
}

impl std::str::FromStr for ModelProfile {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "standard" => Ok(ModelProfile::Standard),
      "high-res" => Ok(ModelProfile::HighRes),
      other => Err(format!("未知的模型规格: {}", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 类别编号到名称的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  /// 标签文本，未知类别使用编号
  pub fn to_label_str(&self, class_id: u32) -> String {
    self
      .name(class_id)
      .map(String::from)
      .unwrap_or_else(|| class_id.to_string())
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 解析 Ultralytics 导出 ONNX 时写入的 `names` 元数据，
  /// 形如 `{0: 'ball', 1: 'hoop'}`
  pub fn parse_metadata(text: &str) -> Option<Self> {
    let body = text.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut entries = Vec::new();
    let mut rest = body.trim_start();

    while !rest.is_empty() {
      let colon = rest.find(':')?;
      let id: usize = rest[..colon].trim().parse().ok()?;
      rest = rest[colon + 1..].trim_start();

      let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
      let close = rest[1..].find(quote)? + 1;
      entries.push((id, rest[1..close].to_string()));
      rest = rest[close + 1..].trim_start();
      rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    entries.sort_by_key(|(id, _)| *id);
    let mut names = Vec::with_capacity(entries.len());
    for (expected, (id, name)) in entries.into_iter().enumerate() {
      if id != expected {
        return None;
      }
      names.push(name);
    }
    Some(Self { names })
  }
}

impl From<Vec<String>> for Labels {
  fn from(names: Vec<String>) -> Self {
    Self::new(names)
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_tract")]
  #[error("YOLO 模型错误: {0}")]
  YoloError(#[from] YoloError),
  #[error("没有可用的模型后端，无法加载 {0}")]
  BackendUnavailable(String),
}

/// 线程间共享的模型句柄
pub type SharedModel = Arc<dyn Model<Error = ModelError> + Send + Sync>;

/// 按目录条目加载模型
pub trait ModelLoader: Send + Sync {
  fn load(&self, path: &Path, entry: &ModelEntry) -> Result<SharedModel, ModelError>;
}

/// 编译时没有启用任何推理后端
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLoader;

impl ModelLoader for UnavailableLoader {
  fn load(&self, _path: &Path, entry: &ModelEntry) -> Result<SharedModel, ModelError> {
    Err(ModelError::BackendUnavailable(entry.name.clone()))
  }
}

#[cfg(feature = "model_tract")]
mod yolo;
#[cfg(feature = "model_tract")]
pub use self::yolo::{YoloBuilder, YoloError, YoloLoader, YoloOnnx};
