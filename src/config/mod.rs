// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 下载配置
    #[serde(default)]
    pub download: DownloadConfig,
    /// 打包下载配置
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天，每天一个文件）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 数据目录（视图根目录）
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// 允许访问的路径白名单（空表示数据目录下全部允许）
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    /// 是否跟随符号链接
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            allowed_paths: vec![],
            follow_symlinks: false,
        }
    }
}

impl StorageConfig {
    /// 验证数据目录存在且可读
    pub fn validate_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            anyhow::bail!("数据目录不存在: {:?}", self.data_dir);
        }
        if !self.data_dir.is_dir() {
            anyhow::bail!("数据目录不是文件夹: {:?}", self.data_dir);
        }
        std::fs::read_dir(&self.data_dir)
            .with_context(|| format!("数据目录不可读: {:?}", self.data_dir))?;

        tracing::debug!("✓ 数据目录验证通过: {:?}", self.data_dir);
        Ok(())
    }
}

/// 下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// 读取缓冲区大小 (KB)
    #[serde(default = "default_chunk_size_kb")]
    pub chunk_size_kb: u64,
    /// 单次请求的最长执行时间（秒），0 表示不限制
    #[serde(default)]
    pub max_execution_secs: u64,
    /// 只支持简单 Content-Disposition 的旧版客户端（User-Agent 正则）
    #[serde(default = "default_legacy_user_agents")]
    pub legacy_user_agents: Vec<String>,
}

fn default_chunk_size_kb() -> u64 {
    512
}

fn default_legacy_user_agents() -> Vec<String> {
    vec![
        // IE
        r"(MSIE)|(Trident)".to_string(),
        // Android 自带 Chrome
        r"Android.*Chrome/[.0-9]*".to_string(),
        // Freebox 机顶盒
        r"^Mozilla/5\.0$".to_string(),
    ]
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size_kb: default_chunk_size_kb(),
            max_execution_secs: 0,
            legacy_user_agents: default_legacy_user_agents(),
        }
    }
}

impl DownloadConfig {
    /// 读取缓冲区字节数
    pub fn chunk_size(&self) -> usize {
        (self.chunk_size_kb.max(1) * 1024) as usize
    }

    /// 执行时间限制
    pub fn max_execution_time(&self) -> Option<Duration> {
        match self.max_execution_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// 打包下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// 是否允许打包下载
    #[serde(default = "default_allow_zip_download")]
    pub allow_zip_download: bool,
    /// 打包输入总大小上限（字节），0 表示不限制
    #[serde(default)]
    pub max_zip_input_size: u64,
    /// 无法从目录名推导时使用的压缩包名（不含扩展名）
    #[serde(default = "default_archive_name")]
    pub default_name: String,
}

fn default_allow_zip_download() -> bool {
    true
}

fn default_archive_name() -> String {
    "download".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            allow_zip_download: default_allow_zip_download(),
            max_zip_input_size: 0,
            default_name: default_archive_name(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("配置已保存: {}", path);
        Ok(())
    }

    /// 加载配置，失败时使用默认配置并写回磁盘
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                let default_config = Self::default();

                // 首次启动：自动创建默认数据目录
                if !default_config.storage.data_dir.exists() {
                    match std::fs::create_dir_all(&default_config.storage.data_dir) {
                        Ok(_) => tracing::info!(
                            "✓ 已创建默认数据目录: {:?}",
                            default_config.storage.data_dir
                        ),
                        Err(e) => tracing::error!(
                            "无法创建默认数据目录 {:?}: {}",
                            default_config.storage.data_dir,
                            e
                        ),
                    }
                }

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }
}
