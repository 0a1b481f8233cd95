// 响应输出抽象
//
// 响应头先排队，第一次写入响应体时提交；提交之前可以任意修改或撤销，
// 提交之后的修改会被忽略。

use std::io::{self, Write};
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::warn;

/// 32 位平台上 Web 服务器会把超出有符号整数的长度写坏，此时不发送 Content-Length
pub fn fits_content_length(len: u64) -> bool {
    usize::BITS > 32 || len <= i32::MAX as u64
}

/// 排队中的响应头
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
    committed: bool,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseHead {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            committed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 读取头的字符串值
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// 标记为已发送
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.reject_after_commit("status") {
            return;
        }
        self.status = status;
    }

    /// 设置（替换）响应头
    pub fn insert(&mut self, name: HeaderName, value: &str) {
        if self.reject_after_commit(name.as_str()) {
            return;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!("响应头值非法，已忽略: {}={:?}", name, value),
        }
    }

    /// 追加响应头（同名头可出现多次，如 Set-Cookie）
    pub fn append(&mut self, name: HeaderName, value: &str) {
        if self.reject_after_commit(name.as_str()) {
            return;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.append(name, value);
            }
            Err(_) => warn!("响应头值非法，已忽略: {}={:?}", name, value),
        }
    }

    pub fn remove(&mut self, name: &HeaderName) {
        if self.reject_after_commit(name.as_str()) {
            return;
        }
        self.headers.remove(name);
    }

    /// 设置 Content-Length；超出平台限制时移除该头
    pub fn set_content_length(&mut self, len: u64) {
        if fits_content_length(len) {
            self.insert(header::CONTENT_LENGTH, &len.to_string());
        } else {
            self.remove(&header::CONTENT_LENGTH);
        }
    }

    /// 清空状态码与所有响应头
    pub fn reset(&mut self) {
        if self.reject_after_commit("*") {
            return;
        }
        self.status = StatusCode::OK;
        self.headers.clear();
    }

    fn reject_after_commit(&self, what: &str) -> bool {
        if self.committed {
            warn!("响应头已发送，忽略修改: {}", what);
        }
        self.committed
    }
}

/// 执行时间预算
///
/// 与脚本超时一致：每次重新设置都从当前时刻起算
#[derive(Debug, Clone, Copy)]
pub struct ExecutionClock {
    limit: Option<Duration>,
    started: Instant,
}

impl ExecutionClock {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            limit,
            started: Instant::now(),
        }
    }

    /// 替换限制并重新计时，返回旧的限制
    pub fn reset(&mut self, limit: Option<Duration>) -> Option<Duration> {
        self.started = Instant::now();
        std::mem::replace(&mut self.limit, limit)
    }

    pub fn check(&self) -> io::Result<()> {
        match self.limit {
            Some(limit) if self.started.elapsed() > limit => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("超过最长执行时间 {:?}", limit),
            )),
            _ => Ok(()),
        }
    }
}

/// 响应输出
pub trait ResponseWriter: Write + Send {
    fn head(&self) -> &ResponseHead;

    fn head_mut(&mut self) -> &mut ResponseHead;

    fn headers_sent(&self) -> bool {
        self.head().is_committed()
    }

    /// 客户端断开后是否继续执行（丢弃输出），返回旧值
    fn set_ignore_client_abort(&mut self, ignore: bool) -> bool;

    /// 设置执行时间限制（None 为不限制），返回旧值
    fn set_time_limit(&mut self, limit: Option<Duration>) -> Option<Duration>;

    /// 结束响应：没有写过响应体时也会提交响应头
    fn finish(&mut self) -> io::Result<()>;
}

/// 内存响应
///
/// 完整收集状态码、响应头与响应体
#[derive(Debug)]
pub struct BufferedResponse {
    head: ResponseHead,
    body: Vec<u8>,
    clock: ExecutionClock,
    ignore_client_abort: bool,
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            head: ResponseHead::new(),
            body: Vec::new(),
            clock: ExecutionClock::new(None),
            ignore_client_abort: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.head.status()
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.head.header(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn ignores_client_abort(&self) -> bool {
        self.ignore_client_abort
    }
}

impl Write for BufferedResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.clock.check()?;
        self.head.commit();
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseWriter for BufferedResponse {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    fn set_ignore_client_abort(&mut self, ignore: bool) -> bool {
        std::mem::replace(&mut self.ignore_client_abort, ignore)
    }

    fn set_time_limit(&mut self, limit: Option<Duration>) -> Option<Duration> {
        self.clock.reset(limit)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.head.commit();
        Ok(())
    }
}
