// 应用状态

use std::sync::Arc;

use crate::config::AppConfig;
use crate::download::DownloadOrchestrator;
use crate::filesystem::{FilesystemView, LocalStorage, LocalView, Storage};

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 下载编排器（阻塞线程中共享）
    pub orchestrator: Arc<DownloadOrchestrator>,
    /// 数据目录所在存储
    pub storage: Arc<dyn Storage>,
    /// 应用配置
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// 以本地数据目录创建应用状态
    pub fn new(config: AppConfig) -> Self {
        let view: Arc<dyn FilesystemView> = Arc::new(LocalView::new(config.storage.clone()));
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(&config.storage.data_dir));
        let orchestrator = Arc::new(DownloadOrchestrator::new(view, storage.clone(), &config));

        Self {
            orchestrator,
            storage,
            config: Arc::new(config),
        }
    }

    /// 从配置文件加载并创建应用状态
    pub async fn load(config_path: &str) -> Self {
        let config = AppConfig::load_or_default(config_path).await;
        Self::new(config)
    }
}
