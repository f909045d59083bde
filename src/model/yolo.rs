// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/model/yolo.rs - YOLO ONNX 模型
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

//! Ultralytics 导出的 YOLO（v5u / v8 / 11）ONNX 模型。
//!
//! 输出张量形状为 `[1, 4 + 类别数, 候选数]`，每个候选为中心点坐标、宽高与各类别得分。

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::ModelEntry,
  model::{
    DetectItem, DetectResult, Labels, Model, ModelError, ModelLoader, ModelProfile, SharedModel,
  },
};

const YOLO_IOU_THRESHOLD: f32 = 0.7;
const YOLO_MAX_DETECTIONS: usize = 300;
const YOLO_BOX_ATTRS: usize = 4;
const LETTERBOX_FILL: u8 = 114;
const NAMES_METADATA_KEY: &str = "names";

type YoloPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误 {0}: {1}")]
  ModelLoadError(PathBuf, String),
  #[error("Tract 错误: {0}")]
  TractError(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
}

fn tract_error(e: TractError) -> YoloError {
  YoloError::TractError(format!("{:#}", e))
}

pub struct YoloOnnx {
  plan: YoloPlan,
  labels: Labels,
  profile: ModelProfile,
  input_size: u32,
  iou_threshold: f32,
  max_detections: usize,
}

pub struct YoloBuilder {
  model_path: PathBuf,
  profile: ModelProfile,
  labels: Option<Labels>,
  iou_threshold: f32,
  max_detections: usize,
}

impl FromUrlWithScheme for YoloBuilder {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloBuilder {
  type Error = YoloError;

  /// `yolo:///path/to/model.onnx?profile=high-res`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = YoloBuilder::new(url.path());
    for (k, v) in url.query_pairs() {
      if k == "profile" {
        builder.profile = v.parse().map_err(YoloError::ModelPathError)?;
      }
    }
    Ok(builder)
  }
}

impl YoloBuilder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      profile: ModelProfile::default(),
      labels: None,
      iou_threshold: YOLO_IOU_THRESHOLD,
      max_detections: YOLO_MAX_DETECTIONS,
    }
  }

  pub fn profile(mut self, profile: ModelProfile) -> Self {
    self.profile = profile;
    self
  }

  /// 模型文件中没有 `names` 元数据时使用的类别名称
  pub fn labels(mut self, labels: Option<Labels>) -> Self {
    self.labels = labels;
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn build(self) -> Result<YoloOnnx, YoloError> {
    info!("加载模型文件: {}", self.model_path.display());
    let onnx = tract_onnx::onnx();
    let proto = onnx
      .proto_model_for_path(&self.model_path)
      .map_err(|e| YoloError::ModelLoadError(self.model_path.clone(), format!("{:#}", e)))?;

    let metadata_labels = proto
      .metadata_props
      .iter()
      .find(|prop| prop.key == NAMES_METADATA_KEY)
      .and_then(|prop| Labels::parse_metadata(&prop.value));

    let labels = match (metadata_labels, self.labels) {
      (Some(labels), _) => labels,
      (None, Some(labels)) => labels,
      (None, None) => {
        warn!("模型缺少类别名称，标签将使用类别编号");
        Labels::default()
      }
    };
    debug!("模型类别数: {}", labels.len());

    let input_size = self.profile.input_size();
    let side = input_size as usize;
    let plan = onnx
      .model_for_proto_model(&proto)
      .map_err(tract_error)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
      )
      .map_err(tract_error)?
      .into_optimized()
      .map_err(tract_error)?
      .into_runnable()
      .map_err(tract_error)?;
    info!("模型加载完成，输入尺寸 {}x{}", input_size, input_size);

    Ok(YoloOnnx {
      plan,
      labels,
      profile: self.profile,
      input_size,
      iou_threshold: self.iou_threshold,
      max_detections: self.max_detections,
    })
  }
}

impl YoloOnnx {
  fn decode(
    &self,
    output: &Tensor,
    letterbox: &Letterbox,
    confidence: f32,
  ) -> Result<Vec<DetectItem>, YoloError> {
    let view = output
      .to_array_view::<f32>()
      .map_err(tract_error)?
      .into_dimensionality::<tract_ndarray::Ix3>()
      .map_err(|e| YoloError::InvalidOutput(e.to_string()))?;

    let (attrs, candidates) = (view.shape()[1], view.shape()[2]);
    if attrs <= YOLO_BOX_ATTRS {
      return Err(YoloError::InvalidOutput(format!(
        "输出属性数 {} 过少",
        attrs
      )));
    }

    let mut items = Vec::new();
    for i in 0..candidates {
      let (class_id, score) = (YOLO_BOX_ATTRS..attrs)
        .map(|a| (a - YOLO_BOX_ATTRS, view[[0, a, i]]))
        .fold((0, f32::NEG_INFINITY), |best, cur| {
          if cur.1 > best.1 { cur } else { best }
        });

      if score < confidence {
        continue;
      }

      let (cx, cy, w, h) = (
        view[[0, 0, i]],
        view[[0, 1, i]],
        view[[0, 2, i]],
        view[[0, 3, i]],
      );
      let bbox = letterbox.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
      items.push(DetectItem {
        class_id: class_id as u32,
        score,
        bbox,
      });
    }

    Ok(items)
  }
}

impl Model for YoloOnnx {
  type Error = ModelError;

  fn infer(&self, input: &RgbImage, confidence: f32) -> Result<DetectResult, Self::Error> {
    let letterbox = Letterbox::fit(input.dimensions(), self.input_size);
    let tensor = letterbox.tensor(input);

    let outputs = self.plan.run(tvec!(tensor.into())).map_err(tract_error)?;
    let output = outputs
      .first()
      .ok_or_else(|| YoloError::InvalidOutput("模型没有输出".to_string()))?;

    let candidates = self.decode(output, &letterbox, confidence)?;
    debug!("候选框 {} 个", candidates.len());
    let items = non_max_suppression(candidates, self.iou_threshold, self.max_detections);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::from(items))
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }

  fn profile(&self) -> ModelProfile {
    self.profile
  }
}

/// 保持纵横比缩放并填充到方形网络输入
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
  size: u32,
  scale: f32,
  pad_left: u32,
  pad_top: u32,
  resized: (u32, u32),
  source: (u32, u32),
}

impl Letterbox {
  fn fit((width, height): (u32, u32), size: u32) -> Self {
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    Self {
      size,
      scale,
      pad_left: (size - new_w) / 2,
      pad_top: (size - new_h) / 2,
      resized: (new_w, new_h),
      source: (width, height),
    }
  }

  fn canvas(&self, image: &RgbImage) -> RgbImage {
    let resized = imageops::resize(image, self.resized.0, self.resized.1, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(
      &mut canvas,
      &resized,
      self.pad_left as i64,
      self.pad_top as i64,
    );
    canvas
  }

  fn tensor(&self, image: &RgbImage) -> Tensor {
    let canvas = self.canvas(image);
    let side = self.size as usize;
    tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
      canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
    .into_tensor()
  }

  /// 网络坐标映射回原图像素坐标
  fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.source.0 as f32, self.source.1 as f32);
    [
      ((bbox[0] - self.pad_left as f32) / self.scale).clamp(0.0, w),
      ((bbox[1] - self.pad_top as f32) / self.scale).clamp(0.0, h),
      ((bbox[2] - self.pad_left as f32) / self.scale).clamp(0.0, w),
      ((bbox[3] - self.pad_top as f32) / self.scale).clamp(0.0, h),
    ]
  }
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x_a = a[0].max(b[0]);
  let y_a = a[1].max(b[1]);
  let x_b = a[2].min(b[2]);
  let y_b = a[3].min(b[3]);

  let inter = (x_b - x_a).max(0.0) * (y_b - y_a).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别的非极大值抑制，结果按得分降序
fn non_max_suppression(
  mut items: Vec<DetectItem>,
  iou_threshold: f32,
  max_detections: usize,
) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::new();
  for item in items {
    if kept.len() >= max_detections {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) > iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

/// 根据目录条目加载 ONNX 模型
#[derive(Debug, Default, Clone, Copy)]
pub struct YoloLoader;

impl ModelLoader for YoloLoader {
  fn load(&self, path: &Path, entry: &ModelEntry) -> Result<SharedModel, ModelError> {
    let model = YoloBuilder::new(path)
      .profile(entry.profile)
      .labels(entry.labels.clone().map(Labels::from))
      .build()?;
    Ok(Arc::new(model))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn letterbox_wide_frame() {
    let lb = Letterbox::fit((640, 360), 640);
    assert_eq!(lb.resized, (640, 360));
    assert_eq!(lb.pad_left, 0);
    assert_eq!(lb.pad_top, 140);

    let bbox = lb.unmap([10.0, 150.0, 50.0, 190.0]);
    assert_eq!(bbox, [10.0, 10.0, 50.0, 50.0]);
  }

  #[test]
  fn letterbox_upscales_and_clamps() {
    let lb = Letterbox::fit((640, 360), 1280);
    assert_eq!(lb.resized, (1280, 720));
    let bbox = lb.unmap([-20.0, 0.0, 1300.0, 1280.0]);
    assert_eq!(bbox, [0.0, 0.0, 640.0, 360.0]);

    let canvas = lb.canvas(&RgbImage::from_pixel(640, 360, Rgb([255, 0, 0])));
    assert_eq!(canvas.dimensions(), (1280, 1280));
    assert_eq!(canvas.get_pixel(0, 0), &Rgb([LETTERBOX_FILL; 3]));
    let inside = canvas.get_pixel(640, 640);
    assert!(inside[0] > 250 && inside[1] < 5 && inside[2] < 5);
  }

  #[test]
  fn nms_suppresses_same_class_overlap() {
    let kept = non_max_suppression(
      vec![
        item(0, 0.6, [0.0, 0.0, 10.0, 10.0]),
        item(0, 0.9, [1.0, 1.0, 11.0, 11.0]),
        item(1, 0.5, [0.0, 0.0, 10.0, 10.0]),
        item(0, 0.4, [50.0, 50.0, 60.0, 60.0]),
      ],
      0.5,
      YOLO_MAX_DETECTIONS,
    );
    let scores: Vec<f32> = kept.iter().map(|k| k.score).collect();
    assert_eq!(scores, vec![0.9, 0.5, 0.4]);
  }

  #[test]
  fn nms_respects_max_detections() {
    let items = (0..10)
      .map(|i| item(0, 0.5, [i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0]))
      .collect();
    assert_eq!(non_max_suppression(items, 0.7, 3).len(), 3);
  }

  #[test]
  fn iou_of_disjoint_and_identical() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&[0.0; 4], &[0.0; 4]), 0.0);
  }

  #[test]
  fn builder_from_url() {
    let url = Url::parse("yolo:///models/best_YOLOv5n6u.onnx?profile=high-res").unwrap();
    let builder = YoloBuilder::from_url(&url).unwrap();
    assert_eq!(builder.profile, ModelProfile::HighRes);
    assert_eq!(builder.model_path, PathBuf::from("/models/best_YOLOv5n6u.onnx"));

    let url = Url::parse("onnx:///models/x.onnx").unwrap();
    assert!(YoloBuilder::from_url(&url).is_err());
  }
}
