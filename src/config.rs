// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/config.rs - 模型与视频目录配置
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

//! 演示可选的模型、视频以及登录用户。
//!
//! 不指定配置文件时使用内置目录；配置文件为 TOML 格式：
//!
//! ```toml
//! repo_id = "Marxx01/yolo_basket"
//! models_dir = "models"
//!
//! [[models]]
//! name = "YOLOv5n6u"
//! filename = "best_YOLOv5n6u.onnx"
//! profile = "high-res"
//!
//! [[videos]]
//! name = "Video 1"
//! filename = "modelo_test_video.mp4"
//!
//! [[users]]
//! username = "demo"
//! password_sha256 = "..."
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{assets::ArtifactRef, auth::hash_password, model::ModelProfile};

const DEFAULT_REPO_ID: &str = "Marxx01/yolo_basket";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("目录为空: {0}")]
  Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
  pub name: String,
  pub filename: String,
  #[serde(default)]
  pub profile: ModelProfile,
  /// 模型文件没有类别元数据时使用
  #[serde(default)]
  pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
  pub name: String,
  pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
  pub username: String,
  pub password_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
  pub repo_id: String,
  pub models_dir: PathBuf,
  pub videos_dir: PathBuf,
  pub uploads_dir: PathBuf,
  pub models: Vec<ModelEntry>,
  pub videos: Vec<VideoEntry>,
  pub users: Vec<UserEntry>,
}

impl Default for Catalog {
  fn default() -> Self {
    let model = |name: &str, filename: &str, profile| ModelEntry {
      name: name.to_string(),
      filename: filename.to_string(),
      profile,
      labels: None,
    };
    let video = |name: &str, filename: &str| VideoEntry {
      name: name.to_string(),
      filename: filename.to_string(),
    };

    Self {
      repo_id: DEFAULT_REPO_ID.to_string(),
      models_dir: PathBuf::from("models"),
      videos_dir: PathBuf::from("videos"),
      uploads_dir: PathBuf::from("uploads"),
      models: vec![
        model("YOLOv11m", "best_yolo11m.onnx", ModelProfile::Standard),
        model("YOLOv11n", "best_yolo11n.onnx", ModelProfile::Standard),
        model("YOLOv5n6u", "best_YOLOv5n6u.onnx", ModelProfile::HighRes),
        model("YOLOv8m", "best_yolov8m.onnx", ModelProfile::Standard),
        model("YOLOv8x", "best_yolov8x.onnx", ModelProfile::Standard),
      ],
      videos: vec![
        video("Video 1", "modelo_test_video.mp4"),
        video("Video 2", "modelo_train_video.mp4"),
      ],
      users: vec![UserEntry {
        username: "demo".to_string(),
        password_sha256: hash_password("yolo2024"),
      }],
    }
  }
}

impl Catalog {
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    info!("读取配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_toml(&text)
  }

  pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
    let catalog: Catalog = toml::from_str(text)?;
    catalog.validate()?;
    Ok(catalog)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.models.is_empty() {
      return Err(ConfigError::Empty("models"));
    }
    if self.users.is_empty() {
      return Err(ConfigError::Empty("users"));
    }
    Ok(())
  }

  /// 创建模型、视频与上传目录
  pub fn prepare_dirs(&self) -> Result<(), ConfigError> {
    for dir in [&self.models_dir, &self.videos_dir, &self.uploads_dir] {
      std::fs::create_dir_all(dir)?;
    }
    Ok(())
  }

  pub fn model(&self, name: &str) -> Option<&ModelEntry> {
    self.models.iter().find(|m| m.name == name)
  }

  pub fn video(&self, name: &str) -> Option<&VideoEntry> {
    self.videos.iter().find(|v| v.name == name)
  }

  pub fn model_artifact(&self, entry: &ModelEntry) -> ArtifactRef {
    ArtifactRef::new(
      &entry.name,
      &self.repo_id,
      &entry.filename,
      self.models_dir.join(&entry.filename),
    )
  }

  pub fn video_artifact(&self, entry: &VideoEntry) -> ArtifactRef {
    ArtifactRef::new(
      &entry.name,
      &self.repo_id,
      &entry.filename,
      self.videos_dir.join(&entry.filename),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_catalog_matches_demo() {
    let catalog = Catalog::default();
    assert_eq!(catalog.models.len(), 5);
    assert_eq!(catalog.videos.len(), 2);
    assert_eq!(
      catalog.model("YOLOv5n6u").map(|m| m.profile),
      Some(ModelProfile::HighRes)
    );
    assert_eq!(
      catalog.model("YOLOv8x").map(|m| m.profile),
      Some(ModelProfile::Standard)
    );
    assert!(catalog.model("YOLOv3").is_none());

    let artifact = catalog.video_artifact(catalog.video("Video 2").unwrap());
    assert_eq!(artifact.repo_id, "Marxx01/yolo_basket");
    assert_eq!(
      artifact.local_path,
      PathBuf::from("videos/modelo_train_video.mp4")
    );
  }

  #[test]
  fn parse_toml_catalog() {
    let catalog = Catalog::from_toml(
      r#"
        repo_id = "someone/hoops"
        models_dir = "/tmp/m"

        [[models]]
        name = "Tiny"
        filename = "tiny.onnx"
        labels = ["ball", "hoop"]

        [[models]]
        name = "Big"
        filename = "big.onnx"
        profile = "high-res"

        [[users]]
        username = "coach"
        password_sha256 = "00"
      "#,
    )
    .unwrap();

    assert_eq!(catalog.repo_id, "someone/hoops");
    assert_eq!(catalog.models_dir, PathBuf::from("/tmp/m"));
    assert_eq!(catalog.videos_dir, PathBuf::from("videos"));
    assert_eq!(catalog.model("Tiny").unwrap().profile, ModelProfile::Standard);
    assert_eq!(
      catalog.model("Tiny").unwrap().labels.as_deref(),
      Some(&["ball".to_string(), "hoop".to_string()][..])
    );
    assert_eq!(catalog.model("Big").unwrap().profile, ModelProfile::HighRes);
    assert_eq!(
      catalog.model_artifact(catalog.model("Big").unwrap()).local_path,
      PathBuf::from("/tmp/m/big.onnx")
    );
  }

  #[test]
  fn reject_catalog_without_users() {
    let err = Catalog::from_toml(
      r#"
        users = []
      "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Empty("users")));
  }
}
