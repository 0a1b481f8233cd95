// 文件系统视图抽象
//
// 下载子系统只通过这组按路径寻址的操作访问存储：
// 查询元信息、列目录、打开读取流、加解锁。

use std::io::{self, Read};

use super::types::{FileStat, FsError, LockType};

/// 可读取的文件句柄
pub trait ReadHandle: Read + Send {
    /// 定位到指定偏移
    ///
    /// 存储无法定位时返回 `ErrorKind::Unsupported`
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;
}

/// 文件系统视图
pub trait FilesystemView: Send + Sync {
    /// 查询条目元信息，不存在时返回 `FileNotFound`
    fn stat(&self, path: &str) -> Result<FileStat, FsError>;

    /// 列出目录的直接子条目（按名称排序）
    fn list_dir(&self, path: &str) -> Result<Vec<FileStat>, FsError>;

    /// 打开只读流
    fn open_read(&self, path: &str) -> Result<Box<dyn ReadHandle>, FsError>;

    /// 加锁，冲突时返回 `Locked`
    fn lock(&self, path: &str, lock_type: LockType) -> Result<(), FsError>;

    /// 解锁
    fn unlock(&self, path: &str, lock_type: LockType) -> Result<(), FsError>;
}

/// 规范化视图路径：以 `/` 开头，去掉重复和末尾的 `/`
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// 拼接目录与子路径
pub fn join_path(dir: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", dir, name))
}

/// 路径最后一段，根目录返回空串
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// 父目录路径，根目录返回 None
pub fn parent_path(path: &str) -> Option<String> {
    let normalized = normalize_path(path);
    if normalized == "/" {
        return None;
    }
    let parent = match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
    };
    Some(parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("a//b/"), "/a/b");
        assert_eq!(normalize_path("/a/./b"), "/a/b");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a.txt"), "/a.txt");
        assert_eq!(join_path("/photos/", "/2024/b.jpg"), "/photos/2024/b.jpg");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/photos/2024"), "2024");
        assert_eq!(base_name("/photos/2024/"), "2024");
        assert_eq!(base_name("/"), "");
        assert_eq!(base_name(""), "");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/b/c.txt").as_deref(), Some("/a/b"));
        assert_eq!(parent_path("/a").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }
}
