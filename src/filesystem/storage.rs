// 存储抽象：可用空间与 MIME 类型检测

use std::path::{Path, PathBuf};

use sysinfo::Disks;

/// 默认 MIME 类型
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// 存储抽象
pub trait Storage: Send + Sync {
    /// 路径所在磁盘的可用字节数，无法确定时返回 None
    fn free_space(&self, path: &str) -> Option<u64>;

    /// 检测 MIME 类型
    fn mime_type(&self, path: &str) -> String;
}

/// 本地磁盘存储
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Storage for LocalStorage {
    fn free_space(&self, path: &str) -> Option<u64> {
        let relative = path.trim_start_matches('/');
        let target = dunce::canonicalize(self.root.join(relative)).ok()?;

        // 挂载点最长匹配的磁盘即为目标所在磁盘
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }

    fn mime_type(&self, path: &str) -> String {
        mime_for_path(Path::new(path)).to_string()
    }
}

/// 根据扩展名推断 MIME 类型
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return DEFAULT_MIME_TYPE,
    };
    match ext.as_str() {
        // 图片
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        // 视频
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        // 音频
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "aac" => "audio/aac",
        // 文档
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" | "md" | "log" => "text/plain",
        "csv" => "text/csv",
        // 压缩包
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "rar" => "application/vnd.rar",
        // 网页与脚本
        "html" | "htm" => "text/html",
        "xhtml" => "application/xhtml+xml",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => DEFAULT_MIME_TYPE,
    }
}

/// 浏览器可能直接执行的类型降级为纯文本
pub fn secure_mime_type(mime: &str) -> &str {
    match mime {
        "text/html"
        | "application/xhtml+xml"
        | "image/svg+xml"
        | "application/javascript"
        | "text/javascript"
        | "application/xml"
        | "text/xml" => "text/plain",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mime_detection() {
        assert_eq!(mime_for_path(Path::new("/a/photo.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("movie.mp4")), "video/mp4");
        assert_eq!(mime_for_path(Path::new("README")), DEFAULT_MIME_TYPE);
        assert_eq!(mime_for_path(Path::new("x.unknown")), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_secure_mime_type() {
        assert_eq!(secure_mime_type("text/html"), "text/plain");
        assert_eq!(secure_mime_type("image/svg+xml"), "text/plain");
        assert_eq!(secure_mime_type("image/png"), "image/png");
    }

    #[test]
    fn test_free_space_missing_path() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path());
        assert_eq!(storage.free_space("/does/not/exist"), None);
    }

    #[test]
    fn test_storage_mime_type() {
        let storage = LocalStorage::new("/data");
        assert_eq!(storage.mime_type("/docs/report.pdf"), "application/pdf");
    }
}
