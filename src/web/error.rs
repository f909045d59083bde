// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/web/error.rs - 网页错误
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

use axum::{
  extract::multipart::MultipartError,
  http::StatusCode,
  response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{
  assets::FetchError, model::ModelError, output::OutputError, pipeline::PipelineError,
  web::page,
};

pub type WebResult<T> = Result<T, WebError>;

#[derive(Error, Debug)]
pub enum WebError {
  #[error("未知的模型: {0}")]
  UnknownModel(String),
  #[error("未知的视频: {0}")]
  UnknownVideo(String),
  #[error("表单错误: {0}")]
  MultipartError(#[from] MultipartError),
  #[error("下载失败: {0}")]
  FetchError(#[from] FetchError),
  #[error("模型加载失败: {0}")]
  ModelError(#[from] ModelError),
  #[error("处理失败: {0}")]
  PipelineError(#[from] PipelineError),
  #[error("图像编码失败: {0}")]
  OutputError(#[from] OutputError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("后台任务失败: {0}")]
  JoinError(#[from] tokio::task::JoinError),
}

impl WebError {
  fn status_code(&self) -> StatusCode {
    match self {
      WebError::UnknownModel(_) | WebError::UnknownVideo(_) | WebError::MultipartError(_) => {
        StatusCode::BAD_REQUEST
      }
      WebError::FetchError(_) => StatusCode::BAD_GATEWAY,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for WebError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status.is_server_error() {
      error!("请求失败: {}", self);
    }
    (status, Html(page::error_page(status, &self.to_string()))).into_response()
  }
}
