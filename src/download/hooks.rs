// 打包下载前置检查
//
// 在任何字节发出之前依次询问已注册的检查方，任何一方否决即终止

use tracing::{debug, warn};

use crate::config::ArchiveConfig;

/// 打包前置检查的上下文
#[derive(Debug, Clone, Copy)]
pub struct ArchiveContext<'a> {
    /// 请求所在目录
    pub dir: &'a str,
    /// 打包的根条目
    pub paths: &'a [String],
    /// 预扫描得到的文件总大小
    pub total_size: u64,
    /// 文件与文件夹的估算数量
    pub number_of_files: u64,
}

/// 打包前置检查方
pub trait ArchiveHook: Send + Sync {
    fn name(&self) -> &str;

    /// 返回 Err 表示否决，内容为展示给用户的原因
    fn before_zip_created(&self, ctx: &ArchiveContext<'_>) -> Result<(), String>;
}

/// 已注册的检查方
#[derive(Default)]
pub struct ArchiveHooks {
    hooks: Vec<Box<dyn ArchiveHook>>,
}

impl ArchiveHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 含内置策略检查的默认集合
    pub fn with_policy(config: &ArchiveConfig) -> Self {
        let mut hooks = Self::new();
        hooks.register(Box::new(ZipPolicyHook::from_config(config)));
        hooks
    }

    pub fn register(&mut self, hook: Box<dyn ArchiveHook>) {
        debug!("注册打包前置检查: {}", hook.name());
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// 依次执行，第一个否决即返回
    pub fn dispatch(&self, ctx: &ArchiveContext<'_>) -> Result<(), String> {
        for hook in &self.hooks {
            if let Err(reason) = hook.before_zip_created(ctx) {
                warn!(
                    "打包下载被 {} 否决: dir={}, 原因={}",
                    hook.name(),
                    ctx.dir,
                    reason
                );
                return Err(reason);
            }
        }
        Ok(())
    }
}

/// 内置策略：总开关与输入大小上限
#[derive(Debug, Clone)]
pub struct ZipPolicyHook {
    allow_zip_download: bool,
    /// 0 表示不限制
    max_input_size: u64,
}

impl ZipPolicyHook {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            allow_zip_download: config.allow_zip_download,
            max_input_size: config.max_zip_input_size,
        }
    }
}

impl ArchiveHook for ZipPolicyHook {
    fn name(&self) -> &str {
        "zip_policy"
    }

    fn before_zip_created(&self, ctx: &ArchiveContext<'_>) -> Result<(), String> {
        if !self.allow_zip_download {
            return Err("ZIP download is turned off.".to_string());
        }
        if self.max_input_size > 0 && ctx.total_size > self.max_input_size {
            return Err("Selected files too large to generate zip file.".to_string());
        }
        Ok(())
    }
}
