// 文件系统视图模块
//
// 下载子系统依赖的外部协作者边界：按路径寻址的读取、元信息、共享锁，
// 以及存储层的可用空间与 MIME 检测

mod guard;
mod local;
mod lock_table;
mod storage;
mod types;
mod view;

pub use guard::PathGuard;
pub use local::{LocalFile, LocalView};
pub use lock_table::LockTable;
pub use storage::{mime_for_path, secure_mime_type, LocalStorage, Storage, DEFAULT_MIME_TYPE};
pub use types::*;
pub use view::{base_name, join_path, normalize_path, parent_path, FilesystemView, ReadHandle};
