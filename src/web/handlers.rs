// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/web/handlers.rs - 请求处理
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

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{
  Form,
  extract::{
    Multipart, State,
    multipart::Field,
  },
  http::StatusCode,
  response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::web::{
  AppState, VideoChoice,
  error::{WebError, WebResult},
  page::{self, Notice, ResultView},
};

pub async fn health() -> &'static str {
  "ok"
}

pub async fn index(State(state): State<Arc<AppState>>, jar: CookieJar) -> Html<String> {
  let session = state.sessions.get(&jar);
  match session.username.as_deref() {
    Some(username) if session.authenticated => {
      Html(page::detection_page(&state.catalog, username, None, None))
    }
    _ => Html(page::login_page(None)),
  }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
  username: String,
  password: String,
}

pub async fn login(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
  Form(form): Form<LoginForm>,
) -> Response {
  if state.credentials.verify(&form.username, &form.password) {
    info!("用户 {} 登录", form.username);
    let jar = state.sessions.login(jar, &form.username);
    (jar, Redirect::to("/")).into_response()
  } else {
    warn!("用户 {} 登录失败", form.username);
    let notice = Notice::Error(page::INVALID_CREDENTIALS.to_string());
    (StatusCode::UNAUTHORIZED, Html(page::login_page(Some(&notice)))).into_response()
  }
}

pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
  let session = state.sessions.get(&jar);
  if let Some(username) = session.username {
    info!("用户 {} 退出登录", username);
  }
  (state.sessions.logout(jar), Redirect::to("/")).into_response()
}

#[derive(Debug, Default)]
struct ProcessForm {
  model: Option<String>,
  upload_selected: bool,
  video: Option<String>,
  upload: Option<PathBuf>,
}

impl ProcessForm {
  /// 读取失败时删除已保存的上传文件
  async fn read(mut multipart: Multipart, uploads_dir: &Path) -> WebResult<Self> {
    let mut form = ProcessForm::default();
    match form.read_fields(&mut multipart, uploads_dir).await {
      Ok(()) => Ok(form),
      Err(e) => {
        if let Some(upload) = form.upload.take() {
          remove_upload(&upload).await;
        }
        Err(e)
      }
    }
  }

  async fn read_fields(&mut self, multipart: &mut Multipart, uploads_dir: &Path) -> WebResult<()> {
    while let Some(field) = multipart.next_field().await? {
      let name = field.name().unwrap_or_default().to_string();
      match name.as_str() {
        "model" => self.model = Some(field.text().await?),
        "source" => self.upload_selected = field.text().await? == "upload",
        "video" => self.video = Some(field.text().await?),
        "file" => {
          if let Some(old) = self.upload.take() {
            remove_upload(&old).await;
          }
          self.upload = save_upload(field, uploads_dir).await?;
        }
        _ => {}
      }
    }
    Ok(())
  }
}

/// 只保留由字母和数字组成的扩展名，解码器据此选择输入方式
fn upload_extension(file_name: &str) -> Option<String> {
  Path::new(file_name)
    .extension()
    .and_then(|ext| ext.to_str())
    .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    .map(str::to_ascii_lowercase)
}

/// 上传的文件以新的随机文件名保存，空文件视为未选择
async fn save_upload(mut field: Field<'_>, uploads_dir: &Path) -> WebResult<Option<PathBuf>> {
  let original = field.file_name().unwrap_or_default().to_string();
  let name = match upload_extension(&original) {
    Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
    None => Uuid::new_v4().to_string(),
  };
  let path = uploads_dir.join(name);

  let mut file = tokio::fs::File::create(&path).await?;
  let mut written = 0usize;
  let copied = async {
    while let Some(chunk) = field.chunk().await? {
      file.write_all(&chunk).await?;
      written += chunk.len();
    }
    file.flush().await?;
    Ok::<(), WebError>(())
  }
  .await;
  drop(file);

  if let Err(e) = copied {
    remove_upload(&path).await;
    return Err(e);
  }
  if written == 0 {
    remove_upload(&path).await;
    return Ok(None);
  }

  info!("已保存上传文件 {} ({} 字节) 到 {}", original, written, path.display());
  Ok(Some(path))
}

async fn remove_upload(path: &Path) {
  if let Err(e) = tokio::fs::remove_file(path).await {
    warn!("无法删除上传文件 {}: {}", path.display(), e);
  }
}

pub async fn process(
  State(state): State<Arc<AppState>>,
  jar: CookieJar,
  multipart: Multipart,
) -> WebResult<Response> {
  let session = state.sessions.get(&jar);
  let Some(username) = session.username.filter(|_| session.authenticated) else {
    return Ok(Redirect::to("/").into_response());
  };

  let form = ProcessForm::read(multipart, &state.catalog.uploads_dir).await?;
  let render = |notice: Option<&Notice>, result: Option<&ResultView>| {
    Html(page::detection_page(&state.catalog, &username, notice, result)).into_response()
  };

  let model_name = form.model.unwrap_or_default();
  let Some(model) = state.catalog.model(&model_name).cloned() else {
    if let Some(upload) = &form.upload {
      remove_upload(upload).await;
    }
    return Err(WebError::UnknownModel(model_name));
  };

  let choice = if form.upload_selected {
    match form.upload {
      Some(path) => VideoChoice::Upload(path),
      None => {
        let notice = Notice::Warning(page::MISSING_VIDEO.to_string());
        return Ok(render(Some(&notice), None));
      }
    }
  } else {
    if let Some(upload) = &form.upload {
      remove_upload(upload).await;
    }
    let video_name = form.video.unwrap_or_default();
    match state.catalog.video(&video_name) {
      Some(video) => VideoChoice::Catalog(video.clone()),
      None => return Err(WebError::UnknownVideo(video_name)),
    }
  };

  info!("用户 {} 使用模型 {} 处理视频", username, model.name);
  let job_state = state.clone();
  let outcome = tokio::task::spawn_blocking(move || job_state.run(&model, choice)).await?;

  match outcome {
    Ok(result) if result.frames.is_empty() => {
      let notice = Notice::Warning(page::NO_FRAMES.to_string());
      Ok(render(Some(&notice), None))
    }
    Ok(result) => Ok(render(None, Some(&result))),
    Err(e @ (WebError::PipelineError(_) | WebError::ModelError(_) | WebError::FetchError(_))) => {
      warn!("处理失败: {}", e);
      let notice = Notice::Error(e.to_string());
      Ok(render(Some(&notice), None))
    }
    Err(e) => Err(e),
  }
}
