// File Download Core
// 文件与打包下载服务核心库

// 配置管理模块
pub mod config;

// HTTP Range 解析
pub mod range;

// 文件系统视图与锁表
pub mod filesystem;

// 响应流：单文件 / multipart / ZIP
pub mod stream;

// 下载编排：目标分类、加锁、错误页
pub mod download;

// 日志系统
pub mod logging;

// Web服务器模块
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// 导出常用类型
pub use config::AppConfig;
pub use download::{
    DownloadError, DownloadOrchestrator, DownloadOutcome, DownloadRequest, DownloadTarget,
    LockCoordinator,
};
pub use filesystem::{FilesystemView, LocalStorage, LocalView, Storage};
pub use range::{parse_range_header, ByteRange};
pub use server::{build_router, AppState};
pub use stream::{ArchiveStreamer, ResponseWriter, SingleFileStreamer, StreamSession};
