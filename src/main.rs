// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/main.rs - 演示服务主程序
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

mod args;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lankuang::{
  assets::HubFetcher,
  auth::StaticCredentials,
  config::Catalog,
  model::ModelLoader,
  output::draw::Draw,
  web::{AppState, create_router},
};

#[cfg(feature = "model_tract")]
fn model_loader() -> Arc<dyn ModelLoader> {
  Arc::new(lankuang::model::YoloLoader)
}

#[cfg(not(feature = "model_tract"))]
fn model_loader() -> Arc<dyn ModelLoader> {
  warn!("未启用 model_tract 特性，模型无法加载");
  Arc::new(lankuang::model::UnavailableLoader)
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  let catalog = match &args.config {
    Some(path) => Catalog::from_file(path)?,
    None => Catalog::default(),
  };
  catalog.prepare_dirs()?;
  info!(
    "模型仓库: {}，{} 个模型，{} 个示例视频",
    catalog.repo_id,
    catalog.models.len(),
    catalog.videos.len()
  );

  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)?,
    None => Draw::embedded()?,
  };

  let credentials = Arc::new(StaticCredentials::from_entries(&catalog.users));
  let fetcher = Arc::new(HubFetcher::new(&args.hf_endpoint).with_token(args.hf_token.clone()));
  let state = AppState::new(catalog, credentials, fetcher, model_loader(), draw)
    .with_max_frames(args.max_frames)
    .with_upload_limit(args.upload_limit_mb.saturating_mul(1024 * 1024));

  let listener = tokio::net::TcpListener::bind(args.listen).await?;
  info!("监听 http://{}", args.listen);
  axum::serve(listener, create_router(Arc::new(state)))
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已退出");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!("无法监听退出信号: {}", e);
    std::future::pending::<()>().await;
  }
  info!("收到退出信号");
}
