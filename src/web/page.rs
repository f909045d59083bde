// 该文件是 Lankuang （篮筐） 项目的一部分。
// src/web/page.rs - 页面渲染
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

use std::fmt::Write;

use axum::http::StatusCode;
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
  config::Catalog,
  frame::{AnnotatedFrame, FrameSize},
  output::{OutputError, encode_png},
};

const TITLE: &str = "🏀 篮球 YOLO 检测";

pub const INVALID_CREDENTIALS: &str = "用户名或密码错误";
pub const MISSING_VIDEO: &str = "请选择视频";
pub const NO_FRAMES: &str = "视频中没有可读取的帧";

/// 页面顶部的提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  Warning(String),
  Error(String),
}

/// 一帧处理结果，图像以 PNG data URI 内嵌
#[derive(Debug, Clone)]
pub struct FrameView {
  pub index: usize,
  pub size: FrameSize,
  pub data_uri: String,
  pub labels: Vec<String>,
}

impl FrameView {
  pub fn from_frame(frame: &AnnotatedFrame) -> Result<Self, OutputError> {
    let png = encode_png(&frame.image)?;
    Ok(Self {
      index: frame.index,
      size: frame.size(),
      data_uri: format!("data:image/png;base64,{}", STANDARD.encode(png)),
      labels: frame.overlays.iter().map(|o| o.label.clone()).collect(),
    })
  }
}

/// 处理完成后的结果
#[derive(Debug, Clone)]
pub struct ResultView {
  pub model: String,
  pub frames: Vec<FrameView>,
}

pub fn escape_html(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&#39;"),
      c => escaped.push(c),
    }
  }
  escaped
}

fn layout(body: &str) -> String {
  format!(
    "<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n<meta charset=\"utf-8\">\n\
     <title>{TITLE}</title>\n<style>\n\
     body {{ font-family: sans-serif; margin: 2em; }}\n\
     .warning {{ color: #8a6d00; }}\n.error {{ color: #b00020; }}\n\
     .frame img {{ max-width: 100%; }}\n\
     </style>\n</head>\n<body>\n<h1>{TITLE}</h1>\n{body}</body>\n</html>\n"
  )
}

fn notice_html(notice: Option<&Notice>) -> String {
  match notice {
    Some(Notice::Warning(text)) => format!("<p class=\"warning\">{}</p>\n", escape_html(text)),
    Some(Notice::Error(text)) => format!("<p class=\"error\">{}</p>\n", escape_html(text)),
    None => String::new(),
  }
}

pub fn login_page(notice: Option<&Notice>) -> String {
  let mut body = String::from("<h2>登录</h2>\n");
  body.push_str(&notice_html(notice));
  body.push_str(
    "<form method=\"post\" action=\"/login\">\n\
     <label>用户名 <input type=\"text\" name=\"username\"></label>\n\
     <label>密码 <input type=\"password\" name=\"password\"></label>\n\
     <button type=\"submit\">登录</button>\n\
     </form>\n",
  );
  layout(&body)
}

pub fn detection_page(
  catalog: &Catalog,
  username: &str,
  notice: Option<&Notice>,
  result: Option<&ResultView>,
) -> String {
  let mut body = String::new();
  let _ = writeln!(
    body,
    "<p>当前用户: {} <form method=\"post\" action=\"/logout\" style=\"display:inline\">\
     <button type=\"submit\">退出登录</button></form></p>",
    escape_html(username)
  );
  body.push_str(&notice_html(notice));

  body.push_str(
    "<form method=\"post\" action=\"/process\" enctype=\"multipart/form-data\">\n\
     <h2>检测设置</h2>\n<label>模型 <select name=\"model\">\n",
  );
  for model in &catalog.models {
    let name = escape_html(&model.name);
    let _ = writeln!(body, "<option value=\"{name}\">{name}</option>");
  }
  body.push_str(
    "</select></label>\n<fieldset>\n<legend>视频来源</legend>\n\
     <label><input type=\"radio\" name=\"source\" value=\"catalog\" checked> 示例视频</label>\n\
     <select name=\"video\">\n",
  );
  for video in &catalog.videos {
    let name = escape_html(&video.name);
    let _ = writeln!(body, "<option value=\"{name}\">{name}</option>");
  }
  body.push_str(
    "</select>\n\
     <label><input type=\"radio\" name=\"source\" value=\"upload\"> 上传视频</label>\n\
     <input type=\"file\" name=\"file\" accept=\".mp4,.avi,.mov\">\n\
     </fieldset>\n<button type=\"submit\">处理视频</button>\n</form>\n",
  );

  if let Some(result) = result {
    let _ = writeln!(body, "<h2>已处理帧 – {}</h2>", escape_html(&result.model));
    for frame in &result.frames {
      let _ = writeln!(
        body,
        "<div class=\"frame\">\n<img src=\"{}\" width=\"{}\" height=\"{}\" alt=\"第 {} 帧\">\n<p>{}</p>\n</div>",
        frame.data_uri,
        frame.size.width,
        frame.size.height,
        frame.index,
        escape_html(&frame.labels.join(", "))
      );
    }
  }

  layout(&body)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
  let body = format!(
    "<p class=\"error\">{} {}</p>\n<p><a href=\"/\">返回</a></p>\n",
    status.as_u16(),
    escape_html(message)
  );
  layout(&body)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Overlay;
  use image::RgbImage;

  #[test]
  fn escapes_markup() {
    assert_eq!(
      escape_html("<b>\"x\" & 'y'</b>"),
      "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;"
    );
  }

  #[test]
  fn login_page_shows_notice() {
    let page = login_page(Some(&Notice::Error(INVALID_CREDENTIALS.to_string())));
    assert!(page.contains("name=\"password\""));
    assert!(page.contains(INVALID_CREDENTIALS));
  }

  #[test]
  fn detection_page_lists_catalog_and_frames() {
    let frame = AnnotatedFrame {
      index: 0,
      image: RgbImage::new(4, 2),
      overlays: vec![Overlay {
        bbox: [0, 0, 1, 1],
        label: "ball 0.90".to_string(),
      }]
      .into_boxed_slice(),
    };
    let result = ResultView {
      model: "YOLOv8m".to_string(),
      frames: vec![FrameView::from_frame(&frame).unwrap()],
    };

    let page = detection_page(&Catalog::default(), "<demo>", None, Some(&result));
    assert!(page.contains("<option value=\"YOLOv5n6u\">"));
    assert!(page.contains("<option value=\"Video 2\">"));
    assert!(page.contains("&lt;demo&gt;"));
    assert!(page.contains("已处理帧 – YOLOv8m"));
    assert!(page.contains("src=\"data:image/png;base64,iVBORw0KGgo"));
    assert!(page.contains("ball 0.90"));
  }
}
