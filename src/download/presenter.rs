// 错误页面渲染

use std::io::{self, Write};

use axum::http::{header, StatusCode};

use super::error::DownloadError;
use crate::stream::ResponseWriter;

/// 错误页面内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub title: String,
    pub hint: Option<String>,
}

impl ErrorPage {
    /// 忙碌与通用错误页沿用 200 状态码，旧客户端依赖这一行为
    pub fn for_error(err: &DownloadError) -> Self {
        let (status, title, hint) = match err {
            DownloadError::NotFound(_) => (StatusCode::NOT_FOUND, "File not found", None),
            DownloadError::Forbidden { reason: None, .. } => {
                (StatusCode::FORBIDDEN, "Access forbidden", None)
            }
            DownloadError::Forbidden {
                reason: Some(reason),
                ..
            } => (
                StatusCode::FORBIDDEN,
                "Cannot download file",
                Some(reason.clone()),
            ),
            DownloadError::Locked(_) => (
                StatusCode::OK,
                "File is currently busy, please try again later",
                None,
            ),
            DownloadError::Other { hint, .. } => {
                (StatusCode::OK, "Cannot download file", hint.clone())
            }
            DownloadError::Unseekable(_) | DownloadError::Io(_) => {
                (StatusCode::OK, "Cannot download file", None)
            }
        };
        Self {
            status,
            title: title.to_string(),
            hint,
        }
    }
}

/// 错误输出
pub trait ErrorPresenter: Send + Sync {
    /// 调用前响应头必须尚未发送
    fn present(&self, err: &DownloadError, out: &mut dyn ResponseWriter) -> io::Result<()>;
}

/// 简单 HTML 错误页
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlErrorPresenter;

impl HtmlErrorPresenter {
    pub fn render(page: &ErrorPage) -> String {
        let hint = page
            .hint
            .as_deref()
            .map(|h| format!("<p class=\"hint\">{}</p>\n", escape_html(h)))
            .unwrap_or_default();
        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
             <body>\n<h2>{title}</h2>\n{hint}</body>\n</html>\n",
            title = escape_html(&page.title),
            hint = hint
        )
    }
}

impl ErrorPresenter for HtmlErrorPresenter {
    fn present(&self, err: &DownloadError, out: &mut dyn ResponseWriter) -> io::Result<()> {
        let page = ErrorPage::for_error(err);
        let body = Self::render(&page);

        // 丢弃已排队的下载响应头
        let head = out.head_mut();
        head.reset();
        head.set_status(page.status);
        head.insert(header::CONTENT_TYPE, "text/html; charset=utf-8");
        head.set_content_length(body.len() as u64);

        out.write_all(body.as_bytes())?;
        out.finish()
    }
}

fn escape_html(text: &str) -> String {
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
