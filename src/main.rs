use file_download_core::{config::LogConfig, logging, AppConfig, AppState};
use tracing::{info, warn};

const CONFIG_PATH: &str = "config/app.toml";

/// 加载日志配置
///
/// 尝试从配置文件加载，失败时返回默认配置
async fn load_log_config() -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(CONFIG_PATH).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 🔥 先加载日志配置再初始化日志（必须保持 _log_guard 存活）
    let log_config = load_log_config().await;
    let _log_guard = logging::init_logging(&log_config);

    info!(
        "File Download Server v{} 启动中...",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load_or_default(CONFIG_PATH).await;
    config.storage.validate_data_dir()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let app_state = AppState::new(config);
    match app_state.storage.free_space("/") {
        Some(free) => info!(
            "数据目录: {:?}, 可用空间 {:.1} GB",
            app_state.config.storage.data_dir,
            free as f64 / 1024.0 / 1024.0 / 1024.0
        ),
        None => warn!("无法获取数据目录可用空间"),
    }

    let app = file_download_core::build_router(app_state);

    info!("服务器启动在: http://{}", addr);
    info!("下载接口: http://{}/api/v1/download", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app);

    // 🔥 使用 select! 监听关闭信号
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始关闭...");
        }
    }

    info!("应用已安全退出");
    Ok(())
}
