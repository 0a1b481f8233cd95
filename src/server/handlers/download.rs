// 下载 API 处理器

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, Method},
    response::Response,
};
use serde::Deserialize;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::download::{DownloadRequest, FileSelection};
use crate::server::response::{channel, DEFAULT_CHANNEL_CAPACITY};
use crate::server::state::AppState;

/// 查询参数
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// 文件所在目录
    #[serde(default = "default_dir")]
    pub dir: String,
    /// 单个文件名或 JSON 数组
    pub files: String,
    /// 下载开始标记
    #[serde(rename = "downloadStartSecret")]
    pub download_start_secret: Option<String>,
}

fn default_dir() -> String {
    "/".to_string()
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// 下载文件、多文件打包或目录打包
///
/// GET|HEAD /api/v1/download?dir=/photos&files=["a.jpg","b.jpg"]
pub async fn download_files(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("download", request_id = %request_id);

    let request = DownloadRequest {
        dir: query.dir,
        files: FileSelection::parse(&query.files),
        head_request: method == Method::HEAD,
        range: header_value(&headers, header::RANGE),
        user_agent: header_value(&headers, header::USER_AGENT),
        download_start_secret: query.download_start_secret,
    };
    span.in_scope(|| {
        info!(
            "API: 下载请求 dir={}, files={:?}, range={:?}",
            request.dir,
            request.files.names(),
            request.range
        )
    });

    let (mut writer, receiver) = channel(DEFAULT_CHANNEL_CAPACITY);
    let orchestrator = state.orchestrator.clone();

    // 下载核心是同步阻塞 IO，放到阻塞线程池执行
    let task = tokio::task::spawn_blocking(move || {
        span.in_scope(|| orchestrator.serve(&request, &mut writer));
    });
    tokio::spawn(async move {
        if let Err(e) = task.await {
            error!("下载任务异常退出: request_id={}, 错误: {}", request_id, e);
        }
    });

    receiver.into_response().await
}
