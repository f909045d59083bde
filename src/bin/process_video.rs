// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/bin/process_video.rs - 命令行处理单个视频
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

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use lankuang::{
  FromUrl,
  assets::{ArtifactRef, AssetFetcher, HubFetcher},
  input::AnyDecoder,
  model::{ModelProfile, YoloBuilder},
  output::{DirectoryRecordOutput, Render, draw::Draw},
  pipeline::{DEFAULT_MAX_FRAMES, FramePipeline},
};

/// 对单个视频运行检测，把标注后的帧保存到目录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// - 本地: yolo:///path/to/model.onnx?profile=high-res
  /// - 模型仓库: hf://owner/repo/model.onnx?path=models/model.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 模型规格（standard 或 high-res），覆盖模型地址中的设置
  #[arg(long, value_name = "PROFILE")]
  pub profile: Option<ModelProfile>,

  /// 视频文件、图像目录或单张图像
  #[arg(long, value_name = "SOURCE")]
  pub input: PathBuf,

  /// 输出目录，例如 folder:///tmp/out?run
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 最多处理的帧数
  #[arg(long, default_value_t = DEFAULT_MAX_FRAMES, value_name = "COUNT")]
  pub max_frames: usize,

  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 模型仓库访问令牌
  #[arg(long, env = "HF_TOKEN", hide_env_values = true, value_name = "TOKEN")]
  pub hf_token: Option<String>,
}

fn model_builder(args: &Args) -> Result<YoloBuilder> {
  let builder = match args.model.scheme() {
    "yolo" => YoloBuilder::from_url(&args.model)?,
    "hf" => {
      let artifact = ArtifactRef::from_url(&args.model)?;
      let path = HubFetcher::default()
        .with_token(args.hf_token.clone())
        .resolve(&artifact)?;
      YoloBuilder::new(path)
    }
    other => bail!("不支持的模型地址方案: {}", other),
  };
  Ok(match args.profile {
    Some(profile) => builder.profile(profile),
    None => builder,
  })
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input.display());
  info!("输出路径: {}", args.output);

  let model = model_builder(&args)?.build()?;
  let output = DirectoryRecordOutput::from_url(&args.output)?;
  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)?,
    None => Draw::embedded()?,
  };

  let frames = FramePipeline::new(AnyDecoder, draw).process(&args.input, &model, args.max_frames)?;
  for frame in &frames {
    output.render_frame(frame)?;
  }
  output.finish()?;

  let detections: usize = frames.iter().map(|f| f.detection_count()).sum();
  info!(
    "共 {} 帧，{} 个检测结果，已保存到 {}",
    frames.len(),
    detections,
    output.directory().display()
  );
  Ok(())
}
