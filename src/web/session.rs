// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/web/session.rs - 会话状态
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
  collections::HashMap,
  sync::{Mutex, PoisonError},
  time::{Duration, Instant},
};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "lankuang_session";
/// 超过该时长没有访问的会话视为已过期
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// 单个浏览器会话的状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
  pub authenticated: bool,
  pub username: Option<String>,
}

#[derive(Debug)]
struct Session {
  context: SessionContext,
  last_seen: Instant,
}

/// 以 cookie 中的会话编号为键的会话表，只保存在内存中
#[derive(Debug)]
pub struct SessionStore {
  sessions: Mutex<HashMap<Uuid, Session>>,
  idle_timeout: Duration,
}

impl Default for SessionStore {
  fn default() -> Self {
    Self::with_idle_timeout(SESSION_IDLE_TIMEOUT)
  }
}

impl SessionStore {
  pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
    Self {
      sessions: Mutex::new(HashMap::new()),
      idle_timeout,
    }
  }

  fn session_id(jar: &CookieJar) -> Option<Uuid> {
    jar
      .get(SESSION_COOKIE)
      .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
  }

  fn expired(&self, session: &Session, now: Instant) -> bool {
    now.duration_since(session.last_seen) >= self.idle_timeout
  }

  /// 没有会话、会话未知或已过期时返回未登录状态
  pub fn get(&self, jar: &CookieJar) -> SessionContext {
    let Some(id) = Self::session_id(jar) else {
      return SessionContext::default();
    };
    let now = Instant::now();
    let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
    match sessions.get_mut(&id) {
      Some(session) if !self.expired(session, now) => {
        session.last_seen = now;
        session.context.clone()
      }
      Some(_) => {
        sessions.remove(&id);
        SessionContext::default()
      }
      None => SessionContext::default(),
    }
  }

  /// 登录成功后总是换发新的会话编号
  pub fn login(&self, jar: CookieJar, username: &str) -> CookieJar {
    let now = Instant::now();
    let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(old) = Self::session_id(&jar) {
      sessions.remove(&old);
    }
    sessions.retain(|_, session| !self.expired(session, now));

    let id = Uuid::new_v4();
    sessions.insert(
      id,
      Session {
        context: SessionContext {
          authenticated: true,
          username: Some(username.to_string()),
        },
        last_seen: now,
      },
    );

    jar.add(
      Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax),
    )
  }

  pub fn logout(&self, jar: CookieJar) -> CookieJar {
    if let Some(id) = Self::session_id(&jar) {
      self
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    }
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
  }

  pub fn len(&self) -> usize {
    self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn jar_with(value: &str) -> CookieJar {
    CookieJar::new().add(Cookie::new(SESSION_COOKIE, value.to_string()))
  }

  #[test]
  fn unknown_session_is_anonymous() {
    let store = SessionStore::default();
    assert_eq!(store.get(&CookieJar::new()), SessionContext::default());
    assert_eq!(store.get(&jar_with("not-a-uuid")), SessionContext::default());
    assert_eq!(
      store.get(&jar_with(&Uuid::new_v4().to_string())),
      SessionContext::default()
    );
  }

  #[test]
  fn login_then_logout() {
    let store = SessionStore::default();
    let jar = store.login(CookieJar::new(), "demo");
    let session = store.get(&jar);
    assert!(session.authenticated);
    assert_eq!(session.username.as_deref(), Some("demo"));
    assert_eq!(store.len(), 1);

    let cookie = jar.get(SESSION_COOKIE).unwrap().value().to_string();
    let jar = store.logout(jar);
    assert!(jar.get(SESSION_COOKIE).is_none());
    assert!(store.is_empty());
    assert!(!store.get(&jar_with(&cookie)).authenticated);
  }

  #[test]
  fn relogin_replaces_session_id() {
    let store = SessionStore::default();
    let first = store.login(CookieJar::new(), "demo");
    let first_id = first.get(SESSION_COOKIE).unwrap().value().to_string();
    let second = store.login(first, "demo");
    let second_id = second.get(SESSION_COOKIE).unwrap().value().to_string();

    assert_ne!(first_id, second_id);
    assert_eq!(store.len(), 1);
    assert!(!store.get(&jar_with(&first_id)).authenticated);
  }

  #[test]
  fn idle_sessions_expire() {
    let store = SessionStore::with_idle_timeout(Duration::ZERO);
    let first = store.login(CookieJar::new(), "demo");
    assert!(!store.get(&first).authenticated);
    assert!(store.is_empty());

    store.login(CookieJar::new(), "demo");
    store.login(CookieJar::new(), "demo");
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn active_session_survives_other_logins() {
    let store = SessionStore::default();
    let jar = store.login(CookieJar::new(), "demo");
    store.login(CookieJar::new(), "coach");
    assert_eq!(store.len(), 2);
    assert_eq!(store.get(&jar).username.as_deref(), Some("demo"));
  }
}
