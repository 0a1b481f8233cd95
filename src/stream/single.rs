// 单文件下载
//
// 状态流转：RESOLVE -> HEADERS -> (BODY | DONE)

use std::io::Write;

use axum::http::{header, StatusCode};
use tracing::{debug, warn};

use super::copy_range;
use super::headers::{
    content_disposition, set_no_cache_headers, LegacyAgents, CONTENT_TRANSFER_ENCODING,
    X_ACCEL_BUFFERING,
};
use super::response::ResponseWriter;
use super::session::StreamSession;
use crate::download::DownloadError;
use crate::filesystem::{secure_mime_type, FileStat, FilesystemView, Storage};
use crate::range::{parse_range_header, ByteRange};

/// 单文件下载结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleFileOutcome {
    pub status: StatusCode,
    /// 最终采用的区间数
    pub ranges: usize,
    /// 写出的文件字节数（不含 multipart 分隔）
    pub body_bytes: u64,
    /// 是否因存储无法定位而回退到整文件
    pub fell_back: bool,
}

/// 单文件流式输出
pub struct SingleFileStreamer<'a> {
    view: &'a dyn FilesystemView,
    storage: &'a dyn Storage,
    legacy_agents: &'a LegacyAgents,
    chunk_size: usize,
}

impl<'a> SingleFileStreamer<'a> {
    pub fn new(
        view: &'a dyn FilesystemView,
        storage: &'a dyn Storage,
        legacy_agents: &'a LegacyAgents,
        chunk_size: usize,
    ) -> Self {
        Self {
            view,
            storage,
            legacy_agents,
            chunk_size,
        }
    }

    /// 输出单个文件
    pub fn stream(
        &self,
        path: &str,
        session: &StreamSession,
        out: &mut dyn ResponseWriter,
    ) -> Result<SingleFileOutcome, DownloadError> {
        // RESOLVE
        let stat = self.view.stat(path)?;
        if !stat.is_file() || !stat.readable {
            return Err(DownloadError::forbidden(path));
        }

        let ranges = match session.range_header.as_deref() {
            Some(value) => parse_range_header(value, stat.size),
            None => Vec::new(),
        };
        let mime = self.storage.mime_type(&stat.path);
        let mime = secure_mime_type(&mime).to_string();

        // HEADERS
        self.send_headers(&stat, &ranges, &mime, session, out);
        if session.head_request {
            return Ok(SingleFileOutcome {
                status: out.head().status(),
                ranges: ranges.len(),
                body_bytes: 0,
                fell_back: false,
            });
        }

        // BODY
        let result = match ranges.len() {
            0 => self.stream_full(&stat.path, out),
            1 => self.read_part(&stat.path, &ranges[0], out),
            _ => self.stream_multipart(&stat, &ranges, &mime, &session.boundary, out),
        };

        match result {
            Ok(body_bytes) => Ok(SingleFileOutcome {
                status: out.head().status(),
                ranges: ranges.len(),
                body_bytes,
                fell_back: false,
            }),
            Err(DownloadError::Unseekable(_)) if !out.headers_sent() => {
                warn!("存储不支持定位读取，回退为整文件输出: {}", stat.path);
                let head = out.head_mut();
                head.remove(&header::ACCEPT_RANGES);
                head.remove(&header::CONTENT_RANGE);
                head.set_status(StatusCode::OK);
                self.send_headers(&stat, &[], &mime, session, out);

                let body_bytes = self.stream_full(&stat.path, out)?;
                Ok(SingleFileOutcome {
                    status: out.head().status(),
                    ranges: 0,
                    body_bytes,
                    fell_back: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn send_headers(
        &self,
        stat: &FileStat,
        ranges: &[ByteRange],
        mime: &str,
        session: &StreamSession,
        out: &mut dyn ResponseWriter,
    ) {
        let legacy = self.legacy_agents.matches(session.user_agent.as_deref());
        let head = out.head_mut();

        head.insert(
            header::CONTENT_DISPOSITION,
            &content_disposition(&stat.name, legacy),
        );
        head.insert(CONTENT_TRANSFER_ENCODING, "binary");
        set_no_cache_headers(head);

        let content_type = match ranges {
            [] => {
                head.set_status(StatusCode::OK);
                head.set_content_length(stat.size);
                mime.to_string()
            }
            [range] => {
                head.set_status(StatusCode::PARTIAL_CONTENT);
                head.insert(header::ACCEPT_RANGES, "bytes");
                head.insert(header::CONTENT_RANGE, &range.content_range());
                head.set_content_length(range.len());
                mime.to_string()
            }
            _ => {
                // 分段总长度无法提前确定
                head.set_status(StatusCode::PARTIAL_CONTENT);
                head.insert(header::ACCEPT_RANGES, "bytes");
                head.remove(&header::CONTENT_LENGTH);
                format!("multipart/byteranges; boundary={}", session.boundary)
            }
        };
        head.insert(header::CONTENT_TYPE, &content_type);
        head.insert(X_ACCEL_BUFFERING, "no");
    }

    fn stream_full(&self, path: &str, out: &mut dyn ResponseWriter) -> Result<u64, DownloadError> {
        let mut handle = self.view.open_read(path)?;
        let copied = copy_range(&mut handle, out, u64::MAX, self.chunk_size)?;
        out.flush()?;
        Ok(copied)
    }

    fn stream_multipart(
        &self,
        stat: &FileStat,
        ranges: &[ByteRange],
        mime: &str,
        boundary: &str,
        out: &mut dyn ResponseWriter,
    ) -> Result<u64, DownloadError> {
        // 先探测存储能否定位，失败时尚未写出任何字节
        self.probe_seekable(&stat.path, stat.size)?;

        let mut total = 0;
        for range in ranges {
            write!(
                out,
                "\r\n--{}\r\nContent-type: {}\r\nContent-range: {}\r\n\r\n",
                boundary,
                mime,
                range.content_range()
            )?;
            total += self.read_part(&stat.path, range, out)?;
        }
        write!(out, "\r\n--{}--\r\n", boundary)?;
        out.flush()?;

        debug!("分段输出完成: {} 段, {} 字节", ranges.len(), total);
        Ok(total)
    }

    /// 打开新句柄并定位到文件末尾，只探测不输出
    fn probe_seekable(&self, path: &str, size: u64) -> Result<(), DownloadError> {
        let mut handle = self.view.open_read(path)?;
        handle
            .seek_to(size)
            .map_err(|e| {
                debug!("定位探测失败: {} ({})", path, e);
                DownloadError::Unseekable(path.to_string())
            })
    }

    /// 每个区间使用独立句柄
    fn read_part(
        &self,
        path: &str,
        range: &ByteRange,
        out: &mut dyn ResponseWriter,
    ) -> Result<u64, DownloadError> {
        let mut handle = self.view.open_read(path)?;
        if range.from != 0 {
            handle.seek_to(range.from).map_err(|e| {
                debug!("定位到 {} 失败: {} ({})", range.from, path, e);
                DownloadError::Unseekable(path.to_string())
            })?;
        }
        let copied = copy_range(&mut handle, out, range.len(), self.chunk_size)?;
        if copied < range.len() {
            warn!(
                "文件在输出过程中变短: {} (区间 {}, 实际 {} 字节)",
                path, range, copied
            );
        }
        Ok(copied)
    }
}
