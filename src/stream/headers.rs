// 下载响应头
//
// Content-Disposition 编码、禁用缓存头与下载开始 Cookie

use axum::http::{header, HeaderName};
use regex::Regex;
use tracing::warn;

use super::response::ResponseHead;

/// Nginx 不缓冲响应体
pub const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");
pub const CONTENT_TRANSFER_ENCODING: HeaderName =
    HeaderName::from_static("content-transfer-encoding");
/// 打包条目数（文件 + 文件夹），供客户端显示进度
pub const X_ARCHIVE_FILE_COUNT: HeaderName = HeaderName::from_static("x-archive-file-count");

/// 下载开始 Cookie 名
pub const DOWNLOAD_STARTED_COOKIE: &str = "ocDownloadStarted";

/// 只认识简单 `filename="..."` 形式的客户端
#[derive(Debug, Clone, Default)]
pub struct LegacyAgents {
    patterns: Vec<Regex>,
}

impl LegacyAgents {
    /// 编译正则列表，非法正则记录警告后跳过
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("旧版客户端 User-Agent 正则无效，已跳过: {} ({})", p, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, user_agent: Option<&str>) -> bool {
        match user_agent {
            Some(ua) => self.patterns.iter().any(|re| re.is_match(ua)),
            None => false,
        }
    }
}

/// 生成 `Content-Disposition` 值
///
/// 文件名按 RFC 3986 百分号编码；旧版客户端不发送 `filename*`
pub fn content_disposition(filename: &str, legacy: bool) -> String {
    let encoded = urlencoding::encode(filename);
    if legacy {
        format!("attachment; filename=\"{}\"", encoded)
    } else {
        format!(
            "attachment; filename*=UTF-8''{}; filename=\"{}\"",
            encoded, encoded
        )
    }
}

/// 单文件下载的禁用缓存头
pub fn set_no_cache_headers(head: &mut ResponseHead) {
    head.insert(header::PRAGMA, "public");
    head.insert(header::EXPIRES, "0");
    head.insert(
        header::CACHE_CONTROL,
        "must-revalidate, post-check=0, pre-check=0",
    );
}

/// 下载开始标记合法：1 到 32 个字母数字、`-` 或 `_`
pub fn is_valid_download_secret(secret: &str) -> bool {
    !secret.is_empty()
        && secret.len() <= 32
        && secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// 设置下载开始 Cookie，标记不合法时忽略
pub fn set_download_started_cookie(head: &mut ResponseHead, secret: &str) -> bool {
    if !is_valid_download_secret(secret) {
        warn!("下载开始标记格式不合法，已忽略");
        return false;
    }
    head.append(
        header::SET_COOKIE,
        &format!("{}={}; Max-Age=20; Path=/", DOWNLOAD_STARTED_COOKIE, secret),
    );
    true
}
