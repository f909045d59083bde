// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/web.rs - 网页界面
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

//! 登录、选择模型与视频、触发处理并展示结果的网页界面。
//!
//! | 路由 | 说明 |
//! |------|------|
//! | `GET /` | 未登录时显示登录表单，否则显示检测页面 |
//! | `POST /login` | 表单 `username`、`password` |
//! | `POST /logout` | 清除会话 |
//! | `POST /process` | multipart 表单 `model`、`source`、`video`、`file` |
//! | `GET /health` | 返回 `ok` |

use std::{
  collections::HashMap,
  path::PathBuf,
  sync::{Arc, Mutex, PoisonError},
};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
  assets::AssetFetcher,
  auth::CredentialStore,
  config::{Catalog, ModelEntry, VideoEntry},
  input::AnyDecoder,
  model::{ModelLoader, SharedModel},
  output::draw::Draw,
  pipeline::{DEFAULT_MAX_FRAMES, FramePipeline},
};

mod error;
mod handlers;
pub mod page;
pub mod session;

pub use self::error::{WebError, WebResult};
pub use self::session::{SESSION_COOKIE, SessionContext, SessionStore};

use self::page::{FrameView, ResultView};

pub const DEFAULT_UPLOAD_LIMIT: usize = 200 * 1024 * 1024;

// 每个模型一个槽位，下载与加载只锁住对应的槽位
type ModelSlot = Arc<Mutex<Option<SharedModel>>>;

/// 待处理的视频
#[derive(Debug, Clone)]
pub enum VideoChoice {
  Catalog(VideoEntry),
  /// 已保存到上传目录的文件，处理后删除
  Upload(PathBuf),
}

pub struct AppState {
  pub catalog: Catalog,
  pub sessions: SessionStore,
  credentials: Arc<dyn CredentialStore>,
  fetcher: Arc<dyn AssetFetcher>,
  loader: Arc<dyn ModelLoader>,
  pipeline: FramePipeline<AnyDecoder>,
  models: Mutex<HashMap<String, ModelSlot>>,
  max_frames: usize,
  upload_limit: usize,
}

impl AppState {
  pub fn new(
    catalog: Catalog,
    credentials: Arc<dyn CredentialStore>,
    fetcher: Arc<dyn AssetFetcher>,
    loader: Arc<dyn ModelLoader>,
    draw: Draw,
  ) -> Self {
    Self {
      catalog,
      sessions: SessionStore::default(),
      credentials,
      fetcher,
      loader,
      pipeline: FramePipeline::new(AnyDecoder, draw),
      models: Mutex::new(HashMap::new()),
      max_frames: DEFAULT_MAX_FRAMES,
      upload_limit: DEFAULT_UPLOAD_LIMIT,
    }
  }

  pub fn with_max_frames(mut self, max_frames: usize) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn with_upload_limit(mut self, upload_limit: usize) -> Self {
    self.upload_limit = upload_limit;
    self
  }

  /// 每个模型只下载、加载一次
  fn model(&self, entry: &ModelEntry) -> WebResult<SharedModel> {
    let slot = self
      .models
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(entry.name.clone())
      .or_default()
      .clone();

    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(model) = slot.as_ref() {
      return Ok(model.clone());
    }

    let path = self.fetcher.resolve(&self.catalog.model_artifact(entry))?;
    let model = self.loader.load(&path, entry)?;
    info!("模型 {} 已加载", entry.name);
    *slot = Some(model.clone());
    Ok(model)
  }

  /// 在阻塞线程中执行：准备模型与视频，运行流水线并编码结果
  fn run(&self, entry: &ModelEntry, choice: VideoChoice) -> WebResult<ResultView> {
    let result = self.run_inner(entry, &choice);
    if let VideoChoice::Upload(path) = &choice
      && let Err(e) = std::fs::remove_file(path)
    {
      warn!("无法删除上传文件 {}: {}", path.display(), e);
    }
    result
  }

  fn run_inner(&self, entry: &ModelEntry, choice: &VideoChoice) -> WebResult<ResultView> {
    let model = self.model(entry)?;
    let video = match choice {
      VideoChoice::Catalog(video) => self.fetcher.resolve(&self.catalog.video_artifact(video))?,
      VideoChoice::Upload(path) => path.clone(),
    };

    let frames = self
      .pipeline
      .process(&video, &*model, self.max_frames)?;
    let frames = frames
      .iter()
      .map(FrameView::from_frame)
      .collect::<Result<Vec<_>, _>>()?;

    Ok(ResultView {
      model: entry.name.clone(),
      frames,
    })
  }
}

pub fn create_router(state: Arc<AppState>) -> Router {
  let upload_limit = state.upload_limit;
  Router::new()
    .route("/", get(handlers::index))
    .route("/login", post(handlers::login))
    .route("/logout", post(handlers::logout))
    .route("/process", post(handlers::process))
    .route("/health", get(handlers::health))
    .layer(DefaultBodyLimit::disable())
    .layer(RequestBodyLimitLayer::new(upload_limit))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use std::{
    path::Path,
    sync::mpsc::{self, Receiver, Sender},
    thread,
    time::Duration,
  };

  use image::RgbImage;

  use super::*;
  use crate::{
    assets::{ArtifactRef, FetchError},
    auth::StaticCredentials,
    model::{DetectResult, Labels, Model, ModelError, ModelProfile},
  };

  struct IdleModel(Labels);

  impl Model for IdleModel {
    type Error = ModelError;

    fn infer(&self, _input: &RgbImage, _confidence: f32) -> Result<DetectResult, Self::Error> {
      Ok(DetectResult::default())
    }

    fn labels(&self) -> &Labels {
      &self.0
    }

    fn profile(&self) -> ModelProfile {
      ModelProfile::Standard
    }
  }

  struct IdleLoader;

  impl ModelLoader for IdleLoader {
    fn load(&self, _path: &Path, _entry: &ModelEntry) -> Result<SharedModel, ModelError> {
      Ok(Arc::new(IdleModel(Labels::default())))
    }
  }

  /// `slow.onnx` 的下载一直等到收到放行信号
  struct GatedFetcher {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
  }

  impl AssetFetcher for GatedFetcher {
    fn resolve(&self, artifact: &ArtifactRef) -> Result<PathBuf, FetchError> {
      if artifact.filename == "slow.onnx" {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
      }
      Ok(artifact.local_path.clone())
    }
  }

  fn entry(name: &str, filename: &str) -> ModelEntry {
    ModelEntry {
      name: name.to_string(),
      filename: filename.to_string(),
      profile: ModelProfile::Standard,
      labels: None,
    }
  }

  #[test]
  fn slow_download_does_not_block_other_models() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let catalog = Catalog::default();
    let credentials = Arc::new(StaticCredentials::from_entries(&catalog.users));
    let state = Arc::new(AppState::new(
      catalog,
      credentials,
      Arc::new(GatedFetcher {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
      }),
      Arc::new(IdleLoader),
      Draw::with_font(None),
    ));

    let fast = entry("Fast", "fast.onnx");
    state.model(&fast).unwrap();

    let slow_state = state.clone();
    let slow = thread::spawn(move || slow_state.model(&entry("Slow", "slow.onnx")).is_ok());
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let fast_state = state.clone();
    thread::spawn(move || {
      let _ = done_tx.send(fast_state.model(&fast).is_ok());
    });
    assert!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());

    release_tx.send(()).unwrap();
    assert!(slow.join().unwrap());
  }
}
