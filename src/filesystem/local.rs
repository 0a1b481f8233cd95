// 本地磁盘文件系统视图
//
// 以配置的数据目录为根，所有视图路径都相对于该目录解析。

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::guard::PathGuard;
use super::lock_table::LockTable;
use super::types::*;
use super::view::{base_name, join_path, normalize_path, parent_path, FilesystemView, ReadHandle};

/// 本地文件系统视图
pub struct LocalView {
    root: PathBuf,
    guard: PathGuard,
    locks: Arc<LockTable>,
}

impl LocalView {
    /// 创建新的本地视图（独立锁表）
    pub fn new(config: StorageConfig) -> Self {
        Self::with_lock_table(config, Arc::new(LockTable::new()))
    }

    /// 创建与其他组件共享锁表的本地视图
    pub fn with_lock_table(config: StorageConfig, locks: Arc<LockTable>) -> Self {
        Self {
            root: config.data_dir.clone(),
            guard: PathGuard::new(config),
            locks,
        }
    }

    /// 数据目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 锁表
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.locks
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        self.guard.resolve(&self.root, path)
    }

    /// 将元数据转换为 FileStat
    fn to_stat(&self, path: String, real: &Path, metadata: &Metadata) -> FileStat {
        let entry_type = if metadata.is_dir() {
            EntryType::Directory
        } else if metadata.is_file() {
            EntryType::File
        } else {
            EntryType::Special
        };

        let readable = match entry_type {
            EntryType::File => File::open(real).is_ok(),
            EntryType::Directory => fs::read_dir(real).is_ok(),
            EntryType::Special => false,
        };

        FileStat {
            name: base_name(&path).to_string(),
            path,
            entry_type,
            size: if metadata.is_file() { metadata.len() } else { 0 },
            modified: metadata.modified().ok(),
            readable,
        }
    }
}

impl FilesystemView for LocalView {
    fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let normalized = normalize_path(path);
        let real = self.resolve(&normalized)?;
        let metadata = fs::metadata(&real)
            .map_err(|e| FsError::from_io(&e, FsErrorCode::FileNotFound).with_path(&normalized))?;
        Ok(self.to_stat(normalized, &real, &metadata))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<FileStat>, FsError> {
        let normalized = normalize_path(path);
        let real = self.resolve(&normalized)?;

        if !real.is_dir() {
            return Err(FsError::new(FsErrorCode::NotADirectory).with_path(normalized));
        }

        let read_dir = fs::read_dir(&real).map_err(|e| {
            error!("读取目录失败: {:?}, 错误: {}", real, e);
            FsError::from_io(&e, FsErrorCode::DirectoryReadFailed).with_path(&normalized)
        })?;

        let mut entries: Vec<FileStat> = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| !self.guard.should_skip_symlink(&entry.path()))
            .filter_map(|entry| {
                let entry_path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                match fs::metadata(&entry_path) {
                    Ok(metadata) => {
                        Some(self.to_stat(join_path(&normalized, &name), &entry_path, &metadata))
                    }
                    Err(e) => {
                        debug!("跳过无法读取元信息的条目: {:?}, 错误: {}", entry_path, e);
                        None
                    }
                }
            })
            .collect();

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn ReadHandle>, FsError> {
        let normalized = normalize_path(path);
        let real = self.resolve(&normalized)?;
        let file = File::open(&real)
            .map_err(|e| FsError::from_io(&e, FsErrorCode::ReadFailed).with_path(&normalized))?;
        Ok(Box::new(LocalFile::new(file)))
    }

    /// 锁定路径及其所有父目录（父目录始终为共享锁）
    fn lock(&self, path: &str, lock_type: LockType) -> Result<(), FsError> {
        let normalized = normalize_path(path);
        self.locks.acquire(&normalized, lock_type)?;

        let mut acquired: Vec<String> = Vec::new();
        let mut current = parent_path(&normalized);
        while let Some(parent) = current {
            if let Err(e) = self.locks.acquire(&parent, LockType::Shared) {
                for held in &acquired {
                    self.locks.release(held, LockType::Shared);
                }
                self.locks.release(&normalized, lock_type);
                // 报告用户请求的路径而不是冲突的父目录
                return Err(e.with_path(normalized));
            }
            current = parent_path(&parent);
            acquired.push(parent);
        }

        Ok(())
    }

    fn unlock(&self, path: &str, lock_type: LockType) -> Result<(), FsError> {
        let normalized = normalize_path(path);
        self.locks.release(&normalized, lock_type);

        let mut current = parent_path(&normalized);
        while let Some(parent) = current {
            self.locks.release(&parent, LockType::Shared);
            current = parent_path(&parent);
        }

        Ok(())
    }
}

/// 本地文件句柄
///
/// `seek` 失败时（管道、部分网络文件系统）退化为向前读取并丢弃
pub struct LocalFile {
    file: File,
    position: u64,
}

impl LocalFile {
    pub fn new(file: File) -> Self {
        Self { file, position: 0 }
    }
}

impl Read for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl ReadHandle for LocalFile {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        match self.file.seek(SeekFrom::Start(offset)) {
            Ok(pos) => {
                self.position = pos;
                Ok(())
            }
            Err(e) => {
                warn!("文件定位失败，改为顺序读取跳过: offset={}, 错误: {}", offset, e);
                if offset < self.position {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "无法向后定位顺序读取的文件",
                    ));
                }
                let to_skip = offset - self.position;
                let skipped = io::copy(&mut (&mut self.file).take(to_skip), &mut io::sink())?;
                self.position += skipped;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_view() -> (TempDir, LocalView) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        // root/
        // ├── a.txt
        // └── docs/
        //     ├── b.txt
        //     └── nested/
        //         └── c.txt
        fs::write(root.join("a.txt"), "hello world").unwrap();
        fs::create_dir_all(root.join("docs/nested")).unwrap();
        fs::write(root.join("docs/b.txt"), "bb").unwrap();
        fs::write(root.join("docs/nested/c.txt"), "ccc").unwrap();

        let config = StorageConfig {
            data_dir: root.to_path_buf(),
            ..Default::default()
        };
        (temp, LocalView::new(config))
    }

    #[test]
    fn test_stat_file_and_dir() {
        let (_temp, view) = create_view();

        let file = view.stat("/a.txt").unwrap();
        assert!(file.is_file());
        assert_eq!(file.size, 11);
        assert_eq!(file.name, "a.txt");
        assert!(file.readable);

        let dir = view.stat("docs/").unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.path, "/docs");
    }

    #[test]
    fn test_stat_missing() {
        let (_temp, view) = create_view();
        let err = view.stat("/nope.txt").unwrap_err();
        assert_eq!(err.code, FsErrorCode::FileNotFound);
    }

    #[test]
    fn test_list_dir_sorted() {
        let (_temp, view) = create_view();
        let entries = view.list_dir("/docs").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "nested"]);
        assert_eq!(entries[1].path, "/docs/nested");
    }

    #[test]
    fn test_list_dir_on_file() {
        let (_temp, view) = create_view();
        let err = view.list_dir("/a.txt").unwrap_err();
        assert_eq!(err.code, FsErrorCode::NotADirectory);
    }

    #[test]
    fn test_open_and_seek() {
        let (_temp, view) = create_view();
        let mut handle = view.open_read("/a.txt").unwrap();
        handle.seek_to(6).unwrap();
        let mut buf = String::new();
        handle.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "world");
    }

    #[test]
    fn test_lock_covers_parents() {
        let (_temp, view) = create_view();
        view.lock("/docs/nested/c.txt", LockType::Shared).unwrap();

        let table = view.lock_table();
        assert_eq!(table.shared_count("/docs/nested/c.txt"), 1);
        assert_eq!(table.shared_count("/docs/nested"), 1);
        assert_eq!(table.shared_count("/docs"), 1);
        assert_eq!(table.shared_count("/"), 1);

        view.unlock("/docs/nested/c.txt", LockType::Shared).unwrap();
        assert_eq!(table.locked_paths(), 0);
    }

    #[test]
    fn test_lock_conflict_rolls_back() {
        let (_temp, view) = create_view();
        view.lock("/docs", LockType::Exclusive).unwrap();

        let err = view.lock("/docs/b.txt", LockType::Shared).unwrap_err();
        assert_eq!(err.code, FsErrorCode::Locked);
        assert_eq!(err.path.as_deref(), Some("/docs/b.txt"));
        assert_eq!(view.lock_table().shared_count("/docs/b.txt"), 0);

        view.unlock("/docs", LockType::Exclusive).unwrap();
        assert_eq!(view.lock_table().locked_paths(), 0);
    }
}
