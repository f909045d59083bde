// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/auth.rs - 登录凭据
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

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::UserEntry;

pub trait CredentialStore: Send + Sync {
  fn verify(&self, username: &str, password: &str) -> bool;
}

/// 口令的 SHA-256 十六进制摘要
pub fn hash_password(password: &str) -> String {
  hex::encode(Sha256::digest(password.as_bytes()))
}

/// 启动时载入、之后不再变化的用户表
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
  users: HashMap<String, String>,
}

impl StaticCredentials {
  pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a UserEntry>) -> Self {
    let users = entries
      .into_iter()
      .map(|u| (u.username.clone(), u.password_sha256.to_ascii_lowercase()))
      .collect();
    Self { users }
  }

  pub fn with_user(mut self, username: &str, password: &str) -> Self {
    self
      .users
      .insert(username.to_string(), hash_password(password));
    self
  }
}

impl CredentialStore for StaticCredentials {
  fn verify(&self, username: &str, password: &str) -> bool {
    self
      .users
      .get(username)
      .is_some_and(|digest| *digest == hash_password(password))
  }
}
