// 下载请求与目标分类

use serde::{Deserialize, Serialize};

use crate::filesystem::{base_name, join_path, normalize_path, parent_path, FilesystemView};
use crate::stream::ArchiveJob;

/// 请求下载的文件名（相对于请求目录）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSelection {
    Single(String),
    Multiple(Vec<String>),
}

impl FileSelection {
    /// 解析查询参数：JSON 数组或单个文件名
    pub fn parse(raw: &str) -> Self {
        if raw.trim_start().starts_with('[') {
            if let Ok(names) = serde_json::from_str::<Vec<String>>(raw) {
                return Self::Multiple(names);
            }
        }
        Self::Single(raw.to_string())
    }

    /// 只有一个文件名时返回它（单元素列表视同单个文件名）
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(name) => Some(name),
            Self::Multiple(names) if names.len() == 1 => Some(&names[0]),
            Self::Multiple(_) => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Single(name) => vec![name.as_str()],
            Self::Multiple(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// 一次下载请求
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// 文件所在目录
    pub dir: String,
    pub files: FileSelection,
    pub head_request: bool,
    /// 原始 Range 请求头
    pub range: Option<String>,
    pub user_agent: Option<String>,
    /// 客户端用于识别下载已开始的标记
    pub download_start_secret: Option<String>,
}

impl DownloadRequest {
    pub fn new(dir: impl Into<String>, files: FileSelection) -> Self {
        Self {
            dir: dir.into(),
            files,
            head_request: false,
            range: None,
            user_agent: None,
            download_start_secret: None,
        }
    }
}

/// 下载目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// 单个文件，直接输出
    SingleFile { path: String },
    /// 同一目录下的多个条目，打包输出
    FileSet { base_dir: String, paths: Vec<String> },
    /// 整个目录，打包输出
    Directory { path: String },
}

impl DownloadTarget {
    /// 分类：单个非目录路径为单文件，单个目录或多个路径为打包
    pub fn classify(view: &dyn FilesystemView, dir: &str, files: &FileSelection) -> Self {
        match files.as_single() {
            Some(name) => {
                let path = join_path(dir, name);
                match view.stat(&path) {
                    Ok(stat) if stat.is_dir() => Self::Directory { path },
                    // 不存在的路径按单文件处理，由后续流程报告
                    _ => Self::SingleFile { path },
                }
            }
            None => Self::FileSet {
                base_dir: normalize_path(dir),
                paths: files.names().iter().map(|name| join_path(dir, name)).collect(),
            },
        }
    }

    /// 需要加锁的根路径
    pub fn lock_roots(&self) -> Vec<String> {
        match self {
            Self::SingleFile { path } | Self::Directory { path } => vec![path.clone()],
            Self::FileSet { paths, .. } => paths.clone(),
        }
    }

    /// 打包任务
    ///
    /// 目录下载以目录名命名；多文件下载以所在目录名命名，根目录使用默认名
    pub fn archive_job(&self, default_name: &str) -> ArchiveJob {
        let (dir, name_source) = match self {
            Self::SingleFile { path } | Self::Directory { path } => (
                parent_path(path).unwrap_or_else(|| "/".to_string()),
                path.as_str(),
            ),
            Self::FileSet { base_dir, .. } => (base_dir.clone(), base_dir.as_str()),
        };
        let archive_name = match base_name(name_source) {
            "" => default_name,
            name => name,
        };
        ArchiveJob {
            dir,
            paths: self.lock_roots(),
            archive_name: archive_name.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SingleFile { .. } => "single_file",
            Self::FileSet { .. } => "file_set",
            Self::Directory { .. } => "directory",
        }
    }
}
