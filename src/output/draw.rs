// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::debug;

use crate::{
  frame::Overlay,
  model::{DetectItem, DetectResult, Labels},
  output::OutputError,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_OFFSET: i32 = 10; // 标签底边距检测框上沿的距离
const LINE_THICKNESS: i32 = 2;
pub const OVERLAY_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

// 随程序分发的默认字体（DejaVu Sans）
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_offset: i32,
  thickness: i32,
  color: [u8; 3],
}

impl Draw {
  pub fn with_font(font: Option<FontArc>) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_offset: LABEL_OFFSET,
      thickness: LINE_THICKNESS,
      color: OVERLAY_COLOR,
    }
  }

  /// 使用内嵌字体，标签文字总能绘制
  pub fn embedded() -> Result<Self, OutputError> {
    let font = FontArc::try_from_slice(EMBEDDED_FONT)
      .map_err(|_| OutputError::InvalidFont("内嵌字体".to_string()))?;
    debug!("使用内嵌字体");
    Ok(Self::with_font(Some(font)))
  }

  pub fn with_font_file(path: &Path) -> Result<Self, OutputError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|_| OutputError::InvalidFont(path.display().to_string()))?;
    Ok(Self::with_font(Some(font)))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 在图像上绘制全部检测结果，返回实际绘制的内容
  pub fn draw_detections(
    &self,
    image: &mut RgbImage,
    result: &DetectResult,
    labels: &Labels,
  ) -> Vec<Overlay> {
    result
      .items
      .iter()
      .filter_map(|item| self.draw_bbox_with_label(image, item, labels))
      .collect()
  }

  // bbox 为像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    item: &DetectItem,
    labels: &Labels,
  ) -> Option<Overlay> {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return None;
    }

    let x_min = (item.bbox[0] as i32).clamp(0, w - 1);
    let y_min = (item.bbox[1] as i32).clamp(0, h - 1);
    let x_max = (item.bbox[2] as i32).clamp(0, w - 1);
    let y_max = (item.bbox[3] as i32).clamp(0, h - 1);

    if x_min > x_max || y_min > y_max {
      return None;
    }

    // 边框向内加粗
    for t in 0..self.thickness {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }

    let label = format!("{} {:.2}", labels.to_label_str(item.class_id), item.score);

    if let Some(font) = &self.font {
      let scale = PxScale::from(self.font_size);
      let (_, text_height) = text_size(scale, font, &label);
      let label_y = (y_min - self.label_offset - text_height as i32).max(0);
      draw_text_mut(image, Rgb(self.color), x_min, label_y, scale, font, &label);
    }

    Some(Overlay {
      bbox: [x_min, y_min, x_max, y_max],
      label,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const GREEN: Rgb<u8> = Rgb(OVERLAY_COLOR);
  const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

  fn result(items: Vec<DetectItem>) -> DetectResult {
    DetectResult::from(items)
  }

  #[test]
  fn draws_box_and_records_label() {
    let mut image = RgbImage::new(640, 360);
    let labels = Labels::new(vec!["ball".to_string()]);
    let overlays = Draw::with_font(None).draw_detections(
      &mut image,
      &result(vec![DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [10.0, 10.0, 50.0, 50.0],
      }]),
      &labels,
    );

    assert_eq!(
      overlays,
      vec![Overlay {
        bbox: [10, 10, 50, 50],
        label: "ball 0.90".to_string(),
      }]
    );
    assert_eq!(*image.get_pixel(10, 10), GREEN);
    assert_eq!(*image.get_pixel(50, 50), GREEN);
    assert_eq!(*image.get_pixel(11, 30), GREEN);
    assert_eq!(*image.get_pixel(12, 30), BLACK);
    assert_eq!(*image.get_pixel(30, 30), BLACK);
    assert_eq!(*image.get_pixel(51, 51), BLACK);
  }

  #[test]
  fn box_is_clamped_to_image() {
    let mut image = RgbImage::new(100, 100);
    let overlays = Draw::with_font(None).draw_detections(
      &mut image,
      &result(vec![DetectItem {
        class_id: 3,
        score: 0.5,
        bbox: [-5.0, -5.0, 1000.0, 1000.0],
      }]),
      &Labels::default(),
    );

    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].bbox, [0, 0, 99, 99]);
    assert_eq!(overlays[0].label, "3 0.50");
    assert_eq!(*image.get_pixel(99, 0), GREEN);
  }

  #[test]
  fn empty_result_leaves_image_untouched() {
    let mut image = RgbImage::new(8, 8);
    let overlays =
      Draw::with_font(None).draw_detections(&mut image, &DetectResult::default(), &Labels::default());
    assert!(overlays.is_empty());
    assert!(image.pixels().all(|p| *p == BLACK));
  }

  #[test]
  fn label_is_drawn_above_box() {
    let draw = Draw::embedded().unwrap();
    assert!(draw.has_font());

    let mut image = RgbImage::new(200, 120);
    let labels = Labels::new(vec!["ball".to_string()]);
    let overlays = draw.draw_detections(
      &mut image,
      &result(vec![DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [20.0, 60.0, 120.0, 100.0],
      }]),
      &labels,
    );
    assert_eq!(overlays[0].label, "ball 0.90");

    let lit = |rows: std::ops::Range<u32>| {
      rows
        .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
        .filter(|&(x, y)| *image.get_pixel(x, y) != BLACK)
        .count()
    };
    // 文字位于检测框上沿 10 像素以上
    assert!(lit(0..50) > 0);
    assert_eq!(lit(52..60), 0);
    assert!(image.pixels().all(|p| p.0[0] == 0 && p.0[2] == 0));
  }

  #[test]
  fn without_font_only_box_is_drawn() {
    let mut image = RgbImage::new(200, 120);
    Draw::with_font(None).draw_detections(
      &mut image,
      &result(vec![DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [20.0, 60.0, 120.0, 100.0],
      }]),
      &Labels::new(vec!["ball".to_string()]),
    );
    assert!((0..60).all(|y| (0..200).all(|x| *image.get_pixel(x, y) == BLACK)));
  }

  #[test]
  fn missing_font_file() {
    let err = Draw::with_font_file(Path::new("/no/such/font.ttf")).err().unwrap();
    assert!(matches!(err, OutputError::IoError(_)));

    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.ttf");
    std::fs::write(&bogus, b"not a font").unwrap();
    let err = Draw::with_font_file(&bogus).err().unwrap();
    assert!(matches!(err, OutputError::InvalidFont(_)));
  }
}
