// 文件系统视图数据类型定义

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

// 重新导出配置模块中的 StorageConfig
pub use crate::config::StorageConfig;

/// 文件系统错误码
/// 错误码范围：50001 - 50099
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorCode {
    /// 路径不在白名单
    PathNotAllowed = 50001,
    /// 文件或目录不存在
    FileNotFound = 50002,
    /// 权限不足
    PermissionDenied = 50003,
    /// 符号链接拒绝
    SymlinkRejected = 50004,
    /// 目录读取失败
    DirectoryReadFailed = 50005,
    /// 路径穿越攻击
    PathTraversalDetected = 50006,
    /// 不是普通文件
    NotAFile = 50007,
    /// 不是目录
    NotADirectory = 50008,
    /// 路径被其他操作锁定
    Locked = 50009,
    /// 文件读取失败
    ReadFailed = 50010,
}

impl FsErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::PathNotAllowed => "路径不在允许访问的范围内",
            Self::FileNotFound => "文件不存在",
            Self::PermissionDenied => "没有权限访问该路径",
            Self::SymlinkRejected => "不允许访问符号链接",
            Self::DirectoryReadFailed => "读取目录失败",
            Self::PathTraversalDetected => "检测到路径穿越攻击",
            Self::NotAFile => "指定路径不是文件",
            Self::NotADirectory => "指定路径不是目录",
            Self::Locked => "路径已被锁定",
            Self::ReadFailed => "读取文件失败",
        }
    }
}

/// 文件系统错误
#[derive(Debug)]
pub struct FsError {
    pub code: FsErrorCode,
    pub message: String,
    pub path: Option<String>,
}

impl FsError {
    pub fn new(code: FsErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// 根据 IO 错误类型选择错误码
    pub fn from_io(err: &std::io::Error, fallback: FsErrorCode) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => FsErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => FsErrorCode::PermissionDenied,
            _ => fallback,
        };
        Self::new(code).with_message(format!("{}: {}", code.message(), err))
    }
}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref path) = self.path {
            write!(f, "{}: {}", self.message, path)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for FsError {}

/// 条目类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
    /// 设备文件、套接字等非普通文件
    Special,
}

/// 条目元信息
#[derive(Debug, Clone)]
pub struct FileStat {
    /// 视图内路径（以 `/` 开头）
    pub path: String,
    /// 文件名
    pub name: String,
    /// 条目类型
    pub entry_type: EntryType,
    /// 文件大小（目录为 0）
    pub size: u64,
    /// 修改时间
    pub modified: Option<SystemTime>,
    /// 当前进程是否可读
    pub readable: bool,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}

/// 锁类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    /// 共享锁（读）
    Shared,
    /// 排他锁（写）
    Exclusive,
}
