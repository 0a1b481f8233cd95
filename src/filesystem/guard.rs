// 路径安全守卫
//
// 将视图路径映射到数据目录下的真实路径，防止路径穿越和越权访问

use std::path::{Path, PathBuf};

use super::types::{FsError, FsErrorCode, StorageConfig};

/// 路径安全守卫
#[derive(Debug, Clone)]
pub struct PathGuard {
    config: StorageConfig,
}

impl PathGuard {
    /// 创建新的路径守卫
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// 检查路径是否在白名单内
    ///
    /// 如果白名单为空，表示允许所有路径
    pub fn is_allowed(&self, canonical: &Path) -> bool {
        if self.config.allowed_paths.is_empty() {
            return true;
        }

        self.config.allowed_paths.iter().any(|allowed| {
            dunce::canonicalize(PathBuf::from(allowed))
                .map(|allowed| canonical.starts_with(allowed))
                .unwrap_or(false)
        })
    }

    /// 将视图路径解析为数据目录下的绝对路径
    ///
    /// 目标必须存在；符号链接解析后仍须位于数据目录内，除非配置允许跟随
    pub fn resolve(&self, root: &Path, virtual_path: &str) -> Result<PathBuf, FsError> {
        if self.contains_traversal(virtual_path) {
            return Err(FsError::new(FsErrorCode::PathTraversalDetected).with_path(virtual_path));
        }

        let relative = virtual_path.trim_start_matches('/');
        let joined = if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(relative)
        };

        if !relative.is_empty() && self.should_skip_symlink(&joined) {
            return Err(FsError::new(FsErrorCode::SymlinkRejected).with_path(virtual_path));
        }

        let canonical = dunce::canonicalize(&joined)
            .map_err(|e| FsError::from_io(&e, FsErrorCode::FileNotFound).with_path(virtual_path))?;

        let canonical_root = dunce::canonicalize(root)
            .map_err(|e| FsError::from_io(&e, FsErrorCode::FileNotFound).with_path(virtual_path))?;

        if !self.config.follow_symlinks && !canonical.starts_with(&canonical_root) {
            return Err(FsError::new(FsErrorCode::PathNotAllowed).with_path(virtual_path));
        }

        if !self.is_allowed(&canonical) {
            return Err(FsError::new(FsErrorCode::PathNotAllowed).with_path(virtual_path));
        }

        Ok(canonical)
    }

    /// 检查是否为符号链接
    pub fn is_symlink(&self, path: &Path) -> bool {
        path.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// 列目录时是否跳过该条目
    pub fn should_skip_symlink(&self, path: &Path) -> bool {
        !self.config.follow_symlinks && self.is_symlink(path)
    }

    /// 检查路径是否包含穿越序列
    fn contains_traversal(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        if lower.contains("%2e%2e") || lower.contains("%252e%252e") {
            return true;
        }
        // 只拦截完整的 `..` 路径段，`a..b.txt` 这类文件名是合法的
        lower.split(['/', '\\']).any(|segment| segment == "..")
    }
}
