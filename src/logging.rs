//! 日志系统配置
//!
//! 控制台输出 + 按天滚动的文件输出，超出保留天数的日志文件由 appender 自动清理

use crate::config::LogConfig;
use std::fs;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀，完整文件名形如 file-download.2026-10-16.log
pub const LOG_FILE_PREFIX: &str = "file-download";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 创建按天滚动的文件写入器
pub fn build_file_appender(
    log_dir: &Path,
    retention_days: u32,
) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(retention_days.max(1) as usize)
        .build(log_dir)
}

fn init_console_only(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

/// 初始化日志系统
///
/// 返回的 `LogGuard` 需要保持存活直到程序结束
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if !config.enabled {
        init_console_only(env_filter);
        info!("日志系统初始化完成（仅控制台输出）");
        return LogGuard { _file_guard: None };
    }

    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}", config.log_dir, e);
        init_console_only(env_filter);
        return LogGuard { _file_guard: None };
    }

    let appender = match build_file_appender(&config.log_dir, config.retention_days) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("创建日志文件写入器失败: {}, 回退到仅控制台输出", e);
            init_console_only(env_filter);
            return LogGuard { _file_guard: None };
        }
    };

    // 非阻塞写入，避免下载线程被磁盘日志拖慢
    let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(true);

    // 文件输出层（不带 ANSI 颜色）
    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}",
        config.log_dir, config.retention_days, config.level
    );

    LogGuard {
        _file_guard: Some(file_guard),
    }
}
