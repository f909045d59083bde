// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AnnotatedFrame, FrameSize, Overlay},
  output::{OutputError, Render},
};

const RECORD_FILE: &str = "frames.json";

#[derive(Debug, Clone, Serialize)]
struct FrameRecord {
  index: usize,
  file: String,
  size: FrameSize,
  overlays: Vec<Overlay>,
}

/// 把每一帧保存为 PNG，结束时写出 `frames.json` 记录全部标注
///
/// `folder:///path/to/output`，加上 `?run` 时在目录下按当前时间新建子目录。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  records: Mutex<Vec<FrameRecord>>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = OutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }

    let mut directory = PathBuf::from(uri.path());
    if uri.query_pairs().any(|(k, _)| k == "run") {
      directory = directory.join(Local::now().format("run-%Y%m%d-%H%M%S").to_string());
    }

    Self::new(directory)
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Result<Self, OutputError> {
    let directory = directory.into();
    std::fs::create_dir_all(&directory)?;
    Ok(Self {
      directory,
      records: Mutex::new(Vec::new()),
    })
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }
}

impl Render for DirectoryRecordOutput {
  type Error = OutputError;

  fn render_frame(&self, frame: &AnnotatedFrame) -> Result<(), Self::Error> {
    let file = format!("frame-{:04}.png", frame.index);
    frame.image.save(self.directory.join(&file))?;

    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(FrameRecord {
        index: frame.index,
        file,
        size: frame.size(),
        overlays: frame.overlays.to_vec(),
      });
    Ok(())
  }

  fn finish(&self) -> Result<(), Self::Error> {
    let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
    let path = self.directory.join(RECORD_FILE);
    std::fs::write(&path, serde_json::to_vec_pretty(&*records)?)?;
    info!("已保存 {} 帧到 {}", records.len(), self.directory.display());
    Ok(())
  }
}
