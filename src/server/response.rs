// 通道响应
//
// 下载核心在阻塞线程上同步写出；响应头经 oneshot 送出，响应体分块经有界通道送往
// axum 的流式 Body。通道满时写入阻塞，形成到客户端的背压。

use std::io::{self, Write};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::stream::{ExecutionClock, ResponseHead, ResponseWriter};

/// 默认在途分块数
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// 写入端，在阻塞线程中使用
pub struct ChannelResponse {
    head: ResponseHead,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: mpsc::Sender<Bytes>,
    clock: ExecutionClock,
    ignore_client_abort: bool,
    client_gone: bool,
}

/// 接收端，在异步处理器中转换为 axum 响应
pub struct ResponseReceiver {
    head_rx: oneshot::Receiver<ResponseHead>,
    body_rx: mpsc::Receiver<Bytes>,
}

/// 创建一对通道响应
pub fn channel(capacity: usize) -> (ChannelResponse, ResponseReceiver) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelResponse {
            head: ResponseHead::new(),
            head_tx: Some(head_tx),
            body_tx,
            clock: ExecutionClock::new(None),
            ignore_client_abort: false,
            client_gone: false,
        },
        ResponseReceiver { head_rx, body_rx },
    )
}

impl ChannelResponse {
    fn send_head(&mut self) {
        if let Some(tx) = self.head_tx.take() {
            self.head.commit();
            if tx.send(self.head.clone()).is_err() {
                self.mark_client_gone();
            }
        }
    }

    fn mark_client_gone(&mut self) {
        if !self.client_gone {
            debug!("客户端已断开连接");
            self.client_gone = true;
        }
    }
}

impl Write for ChannelResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.clock.check()?;
        self.send_head();
        if buf.is_empty() {
            return Ok(0);
        }

        if !self.client_gone && self.body_tx.blocking_send(Bytes::copy_from_slice(buf)).is_err() {
            self.mark_client_gone();
        }

        if self.client_gone {
            // 打包期间客户端断开也要继续执行到结束，保证锁按正常路径释放
            if self.ignore_client_abort {
                return Ok(buf.len());
            }
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "客户端已断开连接"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseWriter for ChannelResponse {
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
        self.send_head();
        Ok(())
    }
}

impl ResponseReceiver {
    /// 等待响应头，随后以流的形式转发响应体
    pub async fn into_response(self) -> Response {
        let head = match self.head_rx.await {
            Ok(head) => head,
            // 写入端未提交响应头就退出（panic 等）
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };

        let stream = futures::stream::unfold(self.body_rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<Bytes, io::Error>(chunk), rx))
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = head.status();
        *response.headers_mut() = head.headers().clone();
        response
    }
}
