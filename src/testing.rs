// 测试辅助：内存文件系统视图与可注入故障的响应

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::filesystem::{
    base_name, normalize_path, parent_path, EntryType, FileStat, FilesystemView, FsError,
    FsErrorCode, LockTable, LockType, ReadHandle,
};
use crate::stream::{BufferedResponse, ResponseHead, ResponseWriter};

#[derive(Debug, Clone)]
enum MemoryEntry {
    File(Arc<Vec<u8>>),
    Dir,
}

/// 内存文件系统视图
///
/// 可模拟不支持定位的存储，并统计加解锁调用次数
#[derive(Debug)]
pub struct MemoryView {
    entries: BTreeMap<String, MemoryEntry>,
    unreadable: HashSet<String>,
    seekable: bool,
    locks: LockTable,
    lock_calls: AtomicUsize,
    unlock_calls: AtomicUsize,
}

impl MemoryView {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), MemoryEntry::Dir);
        Self {
            entries,
            unreadable: HashSet::new(),
            seekable: true,
            locks: LockTable::new(),
            lock_calls: AtomicUsize::new(0),
            unlock_calls: AtomicUsize::new(0),
        }
    }

    pub fn unseekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        let path = normalize_path(path);
        self.add_parents(&path);
        self.entries.insert(path, MemoryEntry::Dir);
        self
    }

    pub fn with_file(mut self, path: &str, content: &[u8]) -> Self {
        let path = normalize_path(path);
        self.add_parents(&path);
        self.entries
            .insert(path, MemoryEntry::File(Arc::new(content.to_vec())));
        self
    }

    /// 打开读取时返回权限错误
    pub fn with_unreadable(mut self, path: &str) -> Self {
        self.unreadable.insert(normalize_path(path));
        self
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlock_calls.load(Ordering::SeqCst)
    }

    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    fn add_parents(&mut self, path: &str) {
        let mut current = parent_path(path);
        while let Some(dir) = current {
            current = parent_path(&dir);
            self.entries.entry(dir).or_insert(MemoryEntry::Dir);
        }
    }

    fn to_stat(&self, path: &str, entry: &MemoryEntry) -> FileStat {
        let (entry_type, size) = match entry {
            MemoryEntry::File(content) => (EntryType::File, content.len() as u64),
            MemoryEntry::Dir => (EntryType::Directory, 0),
        };
        FileStat {
            path: path.to_string(),
            name: base_name(path).to_string(),
            entry_type,
            size,
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            readable: !self.unreadable.contains(path),
        }
    }

    fn not_found(path: &str) -> FsError {
        FsError::new(FsErrorCode::FileNotFound).with_path(path)
    }
}

impl FilesystemView for MemoryView {
    fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let path = normalize_path(path);
        let entry = self.entries.get(&path).ok_or_else(|| Self::not_found(&path))?;
        Ok(self.to_stat(&path, entry))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<FileStat>, FsError> {
        let path = normalize_path(path);
        match self.entries.get(&path) {
            Some(MemoryEntry::Dir) => {}
            Some(MemoryEntry::File(_)) => {
                return Err(FsError::new(FsErrorCode::NotADirectory).with_path(path))
            }
            None => return Err(Self::not_found(&path)),
        }
        Ok(self
            .entries
            .iter()
            .filter(|(child, _)| {
                child.as_str() != "/" && parent_path(child).as_deref() == Some(path.as_str())
            })
            .map(|(child, entry)| self.to_stat(child, entry))
            .collect())
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn ReadHandle>, FsError> {
        let path = normalize_path(path);
        if self.unreadable.contains(&path) {
            return Err(FsError::new(FsErrorCode::PermissionDenied).with_path(path));
        }
        match self.entries.get(&path) {
            Some(MemoryEntry::File(content)) => Ok(Box::new(MemoryHandle {
                content: content.clone(),
                position: 0,
                seekable: self.seekable,
            })),
            Some(MemoryEntry::Dir) => Err(FsError::new(FsErrorCode::NotAFile).with_path(path)),
            None => Err(Self::not_found(&path)),
        }
    }

    fn lock(&self, path: &str, lock_type: LockType) -> Result<(), FsError> {
        self.locks.acquire(&normalize_path(path), lock_type)?;
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unlock(&self, path: &str, lock_type: LockType) -> Result<(), FsError> {
        self.locks.release(&normalize_path(path), lock_type);
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryHandle {
    content: Arc<Vec<u8>>,
    position: usize,
    seekable: bool,
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.content[self.position.min(self.content.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl ReadHandle for MemoryHandle {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if !self.seekable {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "stream is not seekable"));
        }
        self.position = offset as usize;
        Ok(())
    }
}

/// 写入指定字节数后断开的响应
#[derive(Debug)]
pub struct FailingResponse {
    inner: BufferedResponse,
    limit: usize,
    panic_once: bool,
}

impl FailingResponse {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: BufferedResponse::new(),
            limit,
            panic_once: false,
        }
    }

    /// 到达上限时 panic 一次，之后的写入按普通故障失败
    pub fn panicking(limit: usize) -> Self {
        Self {
            panic_once: true,
            ..Self::new(limit)
        }
    }

    pub fn inner(&self) -> &BufferedResponse {
        &self.inner
    }
}

impl Write for FailingResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.body().len();
        if written >= self.limit {
            if self.panic_once {
                self.panic_once = false;
                panic!("writer panicked after {} bytes", written);
            }
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        let n = buf.len().min(self.limit - written);
        self.inner.write(&buf[..n])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ResponseWriter for FailingResponse {
    fn head(&self) -> &ResponseHead {
        self.inner.head()
    }

    fn head_mut(&mut self) -> &mut ResponseHead {
        self.inner.head_mut()
    }

    fn set_ignore_client_abort(&mut self, ignore: bool) -> bool {
        self.inner.set_ignore_client_abort(ignore)
    }

    fn set_time_limit(&mut self, limit: Option<Duration>) -> Option<Duration> {
        self.inner.set_time_limit(limit)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.inner.finish()
    }
}
