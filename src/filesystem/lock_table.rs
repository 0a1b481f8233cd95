// 进程内路径锁表
//
// 共享锁可被多个持有者同时持有；排他锁与任何其他锁互斥。
// 冲突时立即返回 Locked 错误，不会阻塞等待。

use dashmap::DashMap;
use tracing::warn;

use super::types::{FsError, FsErrorCode, LockType};

#[derive(Debug, Default, Clone, Copy)]
struct LockState {
    shared: usize,
    exclusive: bool,
}

impl LockState {
    fn is_free(&self) -> bool {
        self.shared == 0 && !self.exclusive
    }
}

/// 路径锁表
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, LockState>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取锁
    pub fn acquire(&self, path: &str, lock_type: LockType) -> Result<(), FsError> {
        let mut state = self.locks.entry(path.to_string()).or_default();
        match lock_type {
            LockType::Shared => {
                if state.exclusive {
                    return Err(FsError::new(FsErrorCode::Locked).with_path(path));
                }
                state.shared += 1;
            }
            LockType::Exclusive => {
                if state.exclusive || state.shared > 0 {
                    return Err(FsError::new(FsErrorCode::Locked).with_path(path));
                }
                state.exclusive = true;
            }
        }
        Ok(())
    }

    /// 释放锁
    ///
    /// 释放未持有的锁只记录警告
    pub fn release(&self, path: &str, lock_type: LockType) {
        let now_free = match self.locks.get_mut(path) {
            Some(mut state) => {
                match lock_type {
                    LockType::Shared if state.shared > 0 => state.shared -= 1,
                    LockType::Exclusive if state.exclusive => state.exclusive = false,
                    _ => warn!("释放未持有的锁: path={}, type={:?}", path, lock_type),
                }
                state.is_free()
            }
            None => {
                warn!("释放未持有的锁: path={}, type={:?}", path, lock_type);
                return;
            }
        };

        if now_free {
            self.locks.remove_if(path, |_, state| state.is_free());
        }
    }

    /// 当前共享锁持有数
    pub fn shared_count(&self, path: &str) -> usize {
        self.locks.get(path).map(|s| s.shared).unwrap_or(0)
    }

    /// 是否持有排他锁
    pub fn is_exclusive(&self, path: &str) -> bool {
        self.locks.get(path).map(|s| s.exclusive).unwrap_or(false)
    }

    /// 当前被锁定的路径数
    pub fn locked_paths(&self) -> usize {
        self.locks.len()
    }
}
