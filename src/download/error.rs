// 下载错误分类

use std::io;

use thiserror::Error;

use crate::filesystem::{FsError, FsErrorCode};

/// 下载错误
///
/// 编排器按变体逐一处理，不会继续向外传播
#[derive(Debug, Error)]
pub enum DownloadError {
    /// 目标不存在
    #[error("文件不存在: {0}")]
    NotFound(String),

    /// 不是可读的普通文件，或被打包前置检查否决
    #[error("禁止下载: {path}")]
    Forbidden {
        path: String,
        /// 否决原因，展示给用户
        reason: Option<String>,
    },

    /// 其他操作持有冲突的锁
    #[error("文件正被其他操作占用: {0}")]
    Locked(String),

    /// 存储无法定位读取位置，触发整文件回退
    #[error("存储不支持定位读取: {0}")]
    Unseekable(String),

    /// 其他错误，hint 为展示给用户的补充说明
    #[error("{message}")]
    Other {
        message: String,
        hint: Option<String>,
    },

    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),
}

impl DownloadError {
    pub fn forbidden(path: impl Into<String>) -> Self {
        Self::Forbidden {
            path: path.into(),
            reason: None,
        }
    }

    pub fn vetoed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Forbidden {
            path: path.into(),
            reason: Some(reason.into()),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            hint: None,
        }
    }

    /// 带用户提示的通用错误
    pub fn with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// 日志用的短类别名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Locked(_) => "locked",
            Self::Unseekable(_) => "unseekable",
            Self::Other { .. } => "other",
            Self::Io(_) => "io",
        }
    }
}

impl From<FsError> for DownloadError {
    fn from(err: FsError) -> Self {
        let path = err.path.clone().unwrap_or_default();
        match err.code {
            FsErrorCode::FileNotFound => Self::NotFound(path),
            FsErrorCode::PathNotAllowed
            | FsErrorCode::PermissionDenied
            | FsErrorCode::SymlinkRejected
            | FsErrorCode::PathTraversalDetected
            | FsErrorCode::NotAFile => Self::forbidden(path),
            FsErrorCode::Locked => Self::Locked(path),
            FsErrorCode::DirectoryReadFailed => {
                Self::with_hint(err.to_string(), "The folder contents could not be listed.")
            }
            FsErrorCode::NotADirectory => {
                Self::with_hint(err.to_string(), "The requested folder does not exist.")
            }
            FsErrorCode::ReadFailed => {
                Self::with_hint(err.to_string(), "The file could not be read from storage.")
            }
        }
    }
}

impl From<zip::result::ZipError> for DownloadError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::with_hint(
                format!("生成压缩包失败: {}", other),
                "The archive could not be generated.",
            ),
        }
    }
}
