// Web服务器模块

pub mod handlers;
pub mod response;
pub mod state;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use response::{channel, ChannelResponse, ResponseReceiver};
pub use state::AppState;

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // GET 路由同时处理 HEAD 请求
        .route("/api/v1/download", get(handlers::download_files))
        .route("/health", get(handlers::health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
