// 下载期间的共享锁
//
// 锁集合在作用域结束时释放，提前返回、流式输出中途失败或 panic 都不例外。
// 加锁失败时，已经拿到的锁随部分构造的集合一起释放。

use tracing::{debug, warn};

use super::error::DownloadError;
use super::target::DownloadTarget;
use crate::filesystem::{FilesystemView, FsErrorCode, LockType};

/// 一次请求持有的共享锁
pub struct LockSet<'a> {
    view: &'a dyn FilesystemView,
    held: Vec<String>,
}

impl<'a> LockSet<'a> {
    fn new(view: &'a dyn FilesystemView) -> Self {
        Self {
            view,
            held: Vec::new(),
        }
    }

    fn lock(&mut self, path: &str) -> Result<(), DownloadError> {
        self.view.lock(path, LockType::Shared)?;
        self.held.push(path.to_string());
        Ok(())
    }

    /// 持有的锁数量（同一路径出现多次按多次计）
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn paths(&self) -> &[String] {
        &self.held
    }

    fn release_all(&mut self) {
        // 逆序释放
        while let Some(path) = self.held.pop() {
            if let Err(e) = self.view.unlock(&path, LockType::Shared) {
                warn!("释放共享锁失败: {} ({})", path, e);
            }
        }
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            debug!("释放 {} 个共享锁", self.held.len());
        }
        self.release_all();
    }
}

/// 锁协调器
pub struct LockCoordinator<'a> {
    view: &'a dyn FilesystemView,
}

impl<'a> LockCoordinator<'a> {
    pub fn new(view: &'a dyn FilesystemView) -> Self {
        Self { view }
    }

    /// 对目标加共享锁，目录递归锁定所有子孙条目
    pub fn acquire(&self, target: &DownloadTarget) -> Result<LockSet<'a>, DownloadError> {
        let mut set = LockSet::new(self.view);
        for root in target.lock_roots() {
            self.lock_tree(&root, &mut set)?;
        }
        debug!("已获取 {} 个共享锁 ({})", set.len(), target.kind());
        Ok(set)
    }

    /// 显式释放，与离开作用域等价
    pub fn release(&self, set: LockSet<'a>) {
        drop(set);
    }

    fn lock_tree(&self, root: &str, set: &mut LockSet<'a>) -> Result<(), DownloadError> {
        let mut stack = vec![root.to_string()];
        while let Some(path) = stack.pop() {
            set.lock(&path)?;

            let is_dir = matches!(self.view.stat(&path), Ok(stat) if stat.is_dir());
            if !is_dir {
                continue;
            }
            match self.view.list_dir(&path) {
                Ok(children) => stack.extend(children.into_iter().rev().map(|c| c.path)),
                // 无权限列出的目录在打包时也会被跳过
                Err(e) if e.code == FsErrorCode::PermissionDenied => {
                    warn!("无权限列出目录，不锁定其内容: {}", path);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::filesystem::{LocalView, LockType};
    use crate::testing::MemoryView;
    use std::fs;
    use tempfile::TempDir;

    fn nested_view() -> MemoryView {
        MemoryView::new()
            .with_file("/root/a.txt", b"a")
            .with_file("/root/sub/b.txt", b"b")
            .with_file("/root/sub/deeper/c.txt", b"c")
            .with_dir("/root/empty")
    }

    #[test]
    fn test_directory_locks_whole_tree() {
        let view = nested_view();
        let coordinator = LockCoordinator::new(&view);
        let target = DownloadTarget::Directory {
            path: "/root".to_string(),
        };

        let set = coordinator.acquire(&target).unwrap();
        // root a.txt empty sub b.txt deeper c.txt
        assert_eq!(set.len(), 7);
        assert_eq!(view.lock_table().shared_count("/root/sub/deeper/c.txt"), 1);

        coordinator.release(set);
        assert_eq!(view.lock_calls(), view.unlock_calls());
        assert_eq!(view.lock_table().locked_paths(), 0);
    }

    #[test]
    fn test_duplicate_paths_balanced() {
        let view = nested_view();
        let coordinator = LockCoordinator::new(&view);
        let target = DownloadTarget::FileSet {
            base_dir: "/root".to_string(),
            paths: vec![
                "/root/sub".to_string(),
                "/root/sub/b.txt".to_string(),
                "/root/sub".to_string(),
            ],
        };

        {
            let set = coordinator.acquire(&target).unwrap();
            assert_eq!(set.len(), 4 + 1 + 4);
            assert_eq!(view.lock_table().shared_count("/root/sub/b.txt"), 3);
        }
        assert_eq!(view.lock_calls(), 9);
        assert_eq!(view.unlock_calls(), 9);
        assert_eq!(view.lock_table().locked_paths(), 0);
    }

    #[test]
    fn test_conflict_releases_partial_set() {
        let view = nested_view();
        view.lock_table()
            .acquire("/root/sub/deeper/c.txt", LockType::Exclusive)
            .unwrap();

        let coordinator = LockCoordinator::new(&view);
        let target = DownloadTarget::Directory {
            path: "/root".to_string(),
        };
        let err = coordinator.acquire(&target).err().unwrap();

        assert!(matches!(err, DownloadError::Locked(_)));
        assert!(view.lock_calls() > 0);
        assert_eq!(view.lock_calls(), view.unlock_calls());
        assert_eq!(view.lock_table().shared_count("/root"), 0);
        assert!(view.lock_table().is_exclusive("/root/sub/deeper/c.txt"));
    }

    #[test]
    fn test_release_on_panic() {
        let view = nested_view();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let coordinator = LockCoordinator::new(&view);
            let _set = coordinator
                .acquire(&DownloadTarget::SingleFile {
                    path: "/root/a.txt".to_string(),
                })
                .unwrap();
            panic!("stream failed");
        }));

        assert!(result.is_err());
        assert_eq!(view.lock_calls(), 1);
        assert_eq!(view.unlock_calls(), 1);
    }

    #[test]
    fn test_local_view_parents_released() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("docs/nested")).unwrap();
        fs::write(temp.path().join("docs/nested/c.txt"), "c").unwrap();

        let view = LocalView::new(StorageConfig {
            data_dir: temp.path().to_path_buf(),
            ..Default::default()
        });
        let coordinator = LockCoordinator::new(&view);
        let set = coordinator
            .acquire(&DownloadTarget::Directory {
                path: "/docs".to_string(),
            })
            .unwrap();
        assert_eq!(set.len(), 3);
        assert!(view.lock_table().shared_count("/") > 0);

        drop(set);
        assert_eq!(view.lock_table().locked_paths(), 0);
    }
}
