// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/assets.rs - 远程模型与视频文件
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

//! 从模型仓库（Hugging Face Hub 兼容接口）按 仓库 + 文件名 下载文件，
//! 并缓存到本地路径。本地文件已存在时直接复用，不再访问网络。

use std::{
  ffi::OsString,
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::{Mutex, PoisonError},
  time::Duration,
};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";
const DEFAULT_REVISION: &str = "main";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum FetchError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的文件地址: {0}")]
  InvalidReference(String),
  #[error("下载 {url} 失败: HTTP {status}")]
  Status { url: String, status: u16 },
  #[error("下载 {url} 失败: {reason}")]
  Transport { url: String, reason: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 远程文件引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
  pub name: String,
  pub repo_id: String,
  pub filename: String,
  pub local_path: PathBuf,
}

impl ArtifactRef {
  pub fn new(name: &str, repo_id: &str, filename: &str, local_path: impl Into<PathBuf>) -> Self {
    Self {
      name: name.to_string(),
      repo_id: repo_id.to_string(),
      filename: filename.to_string(),
      local_path: local_path.into(),
    }
  }

  pub fn remote_url(&self, endpoint: &str, revision: &str) -> String {
    format!(
      "{}/{}/resolve/{}/{}",
      endpoint.trim_end_matches('/'),
      self.repo_id,
      revision,
      urlencoding::encode(&self.filename)
    )
  }
}

impl FromUrlWithScheme for ArtifactRef {
  const SCHEME: &'static str = "hf";
}

impl FromUrl for ArtifactRef {
  type Error = FetchError;

  /// `hf://owner/repo/filename?path=local/cache/path`
  ///
  /// 未指定 `path` 时缓存到当前目录下的同名文件。
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FetchError::SchemeMismatch);
    }

    let owner = url
      .host_str()
      .ok_or_else(|| FetchError::InvalidReference(url.to_string()))?;
    let segments: Vec<&str> = url
      .path_segments()
      .map(|s| s.filter(|seg| !seg.is_empty()).collect())
      .unwrap_or_default();
    let [repo, filename] = segments.as_slice() else {
      return Err(FetchError::InvalidReference(url.to_string()));
    };
    let filename = urlencoding::decode(filename)
      .map_err(|_| FetchError::InvalidReference(url.to_string()))?
      .into_owned();

    let local_path = url
      .query_pairs()
      .find(|(k, _)| k == "path")
      .map(|(_, v)| PathBuf::from(v.as_ref()))
      .unwrap_or_else(|| PathBuf::from(&filename));

    Ok(ArtifactRef {
      name: filename.clone(),
      repo_id: format!("{}/{}", owner, repo),
      filename,
      local_path,
    })
  }
}

pub trait AssetFetcher: Send + Sync {
  /// 返回本地文件路径，文件不存在时先下载
  fn resolve(&self, artifact: &ArtifactRef) -> Result<PathBuf, FetchError>;
}

pub struct HubFetcher {
  endpoint: String,
  revision: String,
  token: Option<String>,
  agent: ureq::Agent,
  lock: Mutex<()>,
}

impl Default for HubFetcher {
  fn default() -> Self {
    Self::new(DEFAULT_HUB_ENDPOINT)
  }
}

impl HubFetcher {
  pub fn new(endpoint: &str) -> Self {
    Self {
      endpoint: endpoint.to_string(),
      revision: DEFAULT_REVISION.to_string(),
      token: None,
      agent: ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .build(),
      lock: Mutex::new(()),
    }
  }

  pub fn with_token(mut self, token: Option<String>) -> Self {
    self.token = token.filter(|t| !t.is_empty());
    self
  }

  pub fn with_revision(mut self, revision: &str) -> Self {
    self.revision = revision.to_string();
    self
  }

  fn download(&self, url: &str, target: &Path) -> Result<(), FetchError> {
    let mut request = self.agent.get(url);
    if let Some(token) = &self.token {
      request = request.set("Authorization", &format!("Bearer {}", token));
    }

    let response = request.call().map_err(|e| match e {
      ureq::Error::Status(status, _) => FetchError::Status {
        url: url.to_string(),
        status,
      },
      ureq::Error::Transport(t) => FetchError::Transport {
        url: url.to_string(),
        reason: t.to_string(),
      },
    })?;

    if let Some(parent) = target.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let partial = partial_path(target);
    let result = (|| {
      let mut writer = BufWriter::new(File::create(&partial)?);
      let bytes = std::io::copy(&mut response.into_reader(), &mut writer)?;
      writer.flush()?;
      std::fs::rename(&partial, target)?;
      Ok::<u64, std::io::Error>(bytes)
    })();

    match result {
      Ok(bytes) => {
        info!(
          "已下载 {} ({:.2} MB)",
          target.display(),
          bytes as f64 / (1024.0 * 1024.0)
        );
        Ok(())
      }
      Err(e) => {
        if let Err(cleanup) = std::fs::remove_file(&partial) {
          warn!("无法删除未完成的文件 {}: {}", partial.display(), cleanup);
        }
        Err(e.into())
      }
    }
  }
}

impl AssetFetcher for HubFetcher {
  fn resolve(&self, artifact: &ArtifactRef) -> Result<PathBuf, FetchError> {
    let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

    if artifact.local_path.exists() {
      return Ok(artifact.local_path.clone());
    }

    let url = artifact.remote_url(&self.endpoint, &self.revision);
    info!("正在从 {} 下载 {}...", artifact.repo_id, artifact.filename);
    self.download(&url, &artifact.local_path)?;
    Ok(artifact.local_path.clone())
  }
}

fn partial_path(target: &Path) -> PathBuf {
  let mut name = OsString::from(target.as_os_str());
  name.push(".part");
  PathBuf::from(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_hub_url() {
    let url = Url::parse("hf://Marxx01/yolo_basket/best_yolo11n.onnx?path=models/n.onnx").unwrap();
    let artifact = ArtifactRef::from_url(&url).unwrap();
    assert_eq!(artifact.repo_id, "Marxx01/yolo_basket");
    assert_eq!(artifact.filename, "best_yolo11n.onnx");
    assert_eq!(artifact.local_path, PathBuf::from("models/n.onnx"));

    let url = Url::parse("hf://Marxx01/yolo_basket/clip.mp4").unwrap();
    let artifact = ArtifactRef::from_url(&url).unwrap();
    assert_eq!(artifact.local_path, PathBuf::from("clip.mp4"));
  }

  #[test]
  fn reject_bad_hub_url() {
    let url = Url::parse("hf://Marxx01/clip.mp4").unwrap();
    assert!(matches!(
      ArtifactRef::from_url(&url),
      Err(FetchError::InvalidReference(_))
    ));
    let url = Url::parse("https://huggingface.co/a/b/c").unwrap();
    assert!(matches!(
      ArtifactRef::from_url(&url),
      Err(FetchError::SchemeMismatch)
    ));
  }

  #[test]
  fn remote_url_layout() {
    let artifact = ArtifactRef::new("Video 1", "Marxx01/yolo_basket", "my clip.mp4", "v.mp4");
    assert_eq!(
      artifact.remote_url("https://huggingface.co/", "main"),
      "https://huggingface.co/Marxx01/yolo_basket/resolve/main/my%20clip.mp4"
    );
  }

  #[test]
  fn cached_file_is_reused_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("best.onnx");
    std::fs::write(&local, b"weights").unwrap();

    let fetcher = HubFetcher::new("http://127.0.0.1:9");
    let artifact = ArtifactRef::new("m", "a/b", "best.onnx", &local);
    assert_eq!(fetcher.resolve(&artifact).unwrap(), local);
    assert_eq!(std::fs::read(&local).unwrap(), b"weights");
  }

  #[test]
  fn failed_download_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("missing.onnx");

    let fetcher = HubFetcher::new("http://127.0.0.1:9").with_token(Some("secret".to_string()));
    let artifact = ArtifactRef::new("m", "a/b", "missing.onnx", &local);
    assert!(fetcher.resolve(&artifact).is_err());
    assert!(!local.exists());
    assert!(!partial_path(&local).exists());
  }
}
