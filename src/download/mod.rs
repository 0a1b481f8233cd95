// 下载子系统
//
// 单文件、多文件打包与目录打包下载的统一入口

mod error;
mod hooks;
mod lock;
mod orchestrator;
mod presenter;
mod target;

pub use error::DownloadError;
pub use hooks::{ArchiveContext, ArchiveHook, ArchiveHooks, ZipPolicyHook};
pub use lock::{LockCoordinator, LockSet};
pub use orchestrator::{DownloadOrchestrator, DownloadOutcome};
pub use presenter::{ErrorPage, ErrorPresenter, HtmlErrorPresenter};
pub use target::{DownloadRequest, DownloadTarget, FileSelection};
