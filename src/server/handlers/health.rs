// 健康检查

use axum::{extract::State, Json};
use serde::Serialize;

use super::ApiResponse;
use crate::server::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// 数据目录所在磁盘的可用字节数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_space: Option<u64>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    if let Err(e) = state.config.storage.validate_data_dir() {
        return Json(ApiResponse::error(503, format!("数据目录不可用: {}", e)));
    }

    let storage = state.storage.clone();
    let free_space = tokio::task::spawn_blocking(move || storage.free_space("/"))
        .await
        .ok()
        .flatten();

    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        service: "file-download-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        free_space,
    }))
}
