// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/args.rs - 服务参数配置
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

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use lankuang::{assets::DEFAULT_HUB_ENDPOINT, pipeline::DEFAULT_MAX_FRAMES};

/// Lankuang 篮球检测演示服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 目录配置文件（TOML），不指定时使用内置的模型、视频与用户
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 监听地址
  #[arg(long, default_value = "127.0.0.1:8501", value_name = "ADDR")]
  pub listen: SocketAddr,

  /// 模型仓库访问令牌
  #[arg(long, env = "HF_TOKEN", hide_env_values = true, value_name = "TOKEN")]
  pub hf_token: Option<String>,

  /// 模型仓库地址
  #[arg(long, env = "HF_ENDPOINT", default_value = DEFAULT_HUB_ENDPOINT, value_name = "URL")]
  pub hf_endpoint: String,

  /// 标签字体文件（TTF/OTF），不指定时使用内嵌字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 每次最多处理的帧数
  #[arg(long, default_value_t = DEFAULT_MAX_FRAMES, value_name = "COUNT")]
  pub max_frames: usize,

  /// 上传文件大小上限（MB）
  #[arg(long, default_value_t = 200, value_name = "MB")]
  pub upload_limit_mb: usize,
}
