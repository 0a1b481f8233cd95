// 下载编排
//
// 分类 -> 加锁 -> 输出 -> 释放锁 -> 出错时输出错误页面。
// 所有 DownloadError 都在这里处理，不会继续向外传播。

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tracing::{error, info, warn};

use super::error::DownloadError;
use super::hooks::ArchiveHooks;
use super::lock::LockCoordinator;
use super::presenter::{ErrorPresenter, HtmlErrorPresenter};
use super::target::{DownloadRequest, DownloadTarget};
use crate::config::AppConfig;
use crate::filesystem::{FilesystemView, Storage};
use crate::stream::{
    set_download_started_cookie, ArchiveStreamer, ArchiveSummary, LegacyAgents, ResponseWriter,
    SingleFileOutcome, SingleFileStreamer, StreamSession,
};

/// 一次下载的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    File(SingleFileOutcome),
    Archive(ArchiveSummary),
    /// 已输出错误页面
    Failed {
        status: StatusCode,
        kind: &'static str,
    },
    /// 响应已开始发送后出错，响应体被截断
    Aborted { kind: &'static str },
}

/// 下载编排器
pub struct DownloadOrchestrator {
    view: Arc<dyn FilesystemView>,
    storage: Arc<dyn Storage>,
    hooks: ArchiveHooks,
    presenter: Box<dyn ErrorPresenter>,
    legacy_agents: LegacyAgents,
    chunk_size: usize,
    max_execution_time: Option<Duration>,
    default_archive_name: String,
}

impl DownloadOrchestrator {
    pub fn new(view: Arc<dyn FilesystemView>, storage: Arc<dyn Storage>, config: &AppConfig) -> Self {
        Self {
            view,
            storage,
            hooks: ArchiveHooks::with_policy(&config.archive),
            presenter: Box::new(HtmlErrorPresenter),
            legacy_agents: LegacyAgents::new(&config.download.legacy_user_agents),
            chunk_size: config.download.chunk_size(),
            max_execution_time: config.download.max_execution_time(),
            default_archive_name: config.archive.default_name.clone(),
        }
    }

    pub fn with_presenter(mut self, presenter: Box<dyn ErrorPresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// 注册额外的打包前置检查
    pub fn hooks_mut(&mut self) -> &mut ArchiveHooks {
        &mut self.hooks
    }

    pub fn view(&self) -> &dyn FilesystemView {
        self.view.as_ref()
    }

    /// 处理一次下载请求
    pub fn serve(&self, request: &DownloadRequest, out: &mut dyn ResponseWriter) -> DownloadOutcome {
        out.set_time_limit(self.max_execution_time);
        let started = Instant::now();

        match self.run(request, out) {
            Ok(outcome) => {
                info!(
                    "下载完成: dir={}, files={:?}, 耗时 {:?}, {:?}",
                    request.dir,
                    request.files.names(),
                    started.elapsed(),
                    outcome
                );
                outcome
            }
            Err(err) => self.handle_error(err, out),
        }
    }

    fn run(
        &self,
        request: &DownloadRequest,
        out: &mut dyn ResponseWriter,
    ) -> Result<DownloadOutcome, DownloadError> {
        let view = self.view.as_ref();
        let target = DownloadTarget::classify(view, &request.dir, &request.files);

        // 锁在离开本函数时释放，错误页面输出前已全部释放
        let _locks = LockCoordinator::new(view).acquire(&target)?;

        let session = StreamSession::new(
            request.head_request,
            request.range.clone(),
            request.user_agent.clone(),
        );
        if let Some(secret) = request.download_start_secret.as_deref() {
            set_download_started_cookie(out.head_mut(), secret);
        }

        let outcome = match &target {
            DownloadTarget::SingleFile { path } => {
                let streamer = SingleFileStreamer::new(
                    view,
                    self.storage.as_ref(),
                    &self.legacy_agents,
                    self.chunk_size,
                );
                DownloadOutcome::File(streamer.stream(path, &session, out)?)
            }
            DownloadTarget::Directory { .. } | DownloadTarget::FileSet { .. } => {
                let streamer =
                    ArchiveStreamer::new(view, &self.hooks, &self.legacy_agents, self.chunk_size);
                let job = target.archive_job(&self.default_archive_name);
                DownloadOutcome::Archive(streamer.stream(&job, &session, out)?)
            }
        };

        out.finish()?;
        Ok(outcome)
    }

    fn handle_error(&self, err: DownloadError, out: &mut dyn ResponseWriter) -> DownloadOutcome {
        let kind = err.kind();
        match &err {
            DownloadError::NotFound(path) => info!("下载目标不存在: {}", path),
            DownloadError::Forbidden { path, reason } => {
                warn!("禁止下载: {} ({})", path, reason.as_deref().unwrap_or("不可读"))
            }
            DownloadError::Locked(path) => warn!("下载目标被占用: {}", path),
            DownloadError::Unseekable(path) => warn!("分段输出中途无法定位: {}", path),
            DownloadError::Other { .. } | DownloadError::Io(_) => error!("下载失败: {}", err),
        }

        if out.headers_sent() {
            // 部分数据已发出，只能截断
            warn!("响应已开始发送，无法输出错误页面: {}", err);
            return DownloadOutcome::Aborted { kind };
        }

        if let Err(e) = self.presenter.present(&err, out) {
            warn!("输出错误页面失败: {}", e);
        }
        DownloadOutcome::Failed {
            status: out.head().status(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArchiveConfig;
    use crate::download::{ArchiveContext, ArchiveHook, FileSelection};
    use std::io::Write;
    use crate::filesystem::{LocalStorage, LockType};
    use crate::stream::BufferedResponse;
    use crate::testing::{FailingResponse, MemoryView};
    use axum::http::header;
    use proptest::prelude::*;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 241) as u8).collect()
    }

    fn view() -> Arc<MemoryView> {
        Arc::new(
            MemoryView::new()
                .with_file("/docs/report.pdf", &content(3000))
                .with_file("/docs/notes.txt", &content(700))
                .with_file("/docs/deep/a/b/c.bin", &content(5000))
                .with_file("/docs/deep/a/d.bin", &content(1200))
                .with_dir("/docs/deep/empty"),
        )
    }

    fn orchestrator(view: Arc<MemoryView>, config: &AppConfig) -> DownloadOrchestrator {
        DownloadOrchestrator::new(view, Arc::new(LocalStorage::new("/")), config)
    }

    fn request(dir: &str, files: &str) -> DownloadRequest {
        DownloadRequest::new(dir, FileSelection::parse(files))
    }

    #[test]
    fn test_single_file_download() {
        let view = view();
        let orchestrator = orchestrator(view.clone(), &AppConfig::default());
        let mut out = BufferedResponse::new();

        let mut req = request("/docs", "report.pdf");
        req.range = Some("bytes=0-9".to_string());
        req.download_start_secret = Some("token123".to_string());
        let outcome = orchestrator.serve(&req, &mut out);

        assert!(matches!(outcome, DownloadOutcome::File(o) if o.status == StatusCode::PARTIAL_CONTENT));
        assert_eq!(out.body(), &content(3000)[..10]);
        assert_eq!(
            out.header(&header::SET_COOKIE),
            Some("ocDownloadStarted=token123; Max-Age=20; Path=/")
        );
        assert_eq!(view.lock_calls(), view.unlock_calls());
    }

    #[test]
    fn test_directory_download() {
        let view = view();
        let orchestrator = orchestrator(view.clone(), &AppConfig::default());
        let mut out = BufferedResponse::new();

        let outcome = orchestrator.serve(&request("/docs", "deep"), &mut out);
        match outcome {
            // deep a b c.bin d.bin empty
            DownloadOutcome::Archive(summary) => assert_eq!(summary.number_of_files, 6),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(out
            .header(&header::CONTENT_DISPOSITION)
            .unwrap()
            .contains("deep.zip"));
        assert_eq!(view.lock_table().locked_paths(), 0);
    }

    #[test]
    fn test_not_found_renders_404() {
        let view = view();
        let orchestrator = orchestrator(view.clone(), &AppConfig::default());
        let mut out = BufferedResponse::new();

        let outcome = orchestrator.serve(&request("/docs", "missing.txt"), &mut out);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                status: StatusCode::NOT_FOUND,
                kind: "not_found"
            }
        );
        assert_eq!(out.status(), StatusCode::NOT_FOUND);
        assert_eq!(view.lock_calls(), view.unlock_calls());
    }

    #[test]
    fn test_locked_renders_busy_page() {
        let view = view();
        view.lock_table()
            .acquire("/docs/notes.txt", LockType::Exclusive)
            .unwrap();
        let orchestrator = orchestrator(view.clone(), &AppConfig::default());
        let mut out = BufferedResponse::new();

        let outcome = orchestrator.serve(&request("/docs", "notes.txt"), &mut out);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                status: StatusCode::OK,
                kind: "locked"
            }
        );
        let body = String::from_utf8(out.body().to_vec()).unwrap();
        assert!(body.contains("File is currently busy, please try again later"));
    }

    #[test]
    fn test_veto_renders_reason() {
        let view = view();
        let config = AppConfig {
            archive: ArchiveConfig {
                allow_zip_download: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let orchestrator = orchestrator(view.clone(), &config);
        let mut out = BufferedResponse::new();

        let outcome =
            orchestrator.serve(&request("/docs", r#"["report.pdf","notes.txt"]"#), &mut out);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                status: StatusCode::FORBIDDEN,
                kind: "forbidden"
            }
        );
        assert_eq!(out.status(), StatusCode::FORBIDDEN);
        let body = String::from_utf8(out.body().to_vec()).unwrap();
        assert!(body.contains("ZIP download is turned off."));
        assert_eq!(view.lock_calls(), view.unlock_calls());
    }

    #[test]
    fn test_failure_after_commit_truncates() {
        let view = view();
        let orchestrator = orchestrator(view.clone(), &AppConfig::default());
        let mut out = FailingResponse::new(100);

        let outcome = orchestrator.serve(&request("/docs", "report.pdf"), &mut out);
        assert_eq!(outcome, DownloadOutcome::Aborted { kind: "io" });
        assert_eq!(out.inner().body(), &content(3000)[..100]);
        assert_eq!(out.inner().header(&header::CONTENT_LENGTH), Some("3000"));
        assert_eq!(view.lock_calls(), view.unlock_calls());
    }

    struct DenyDeepHook;

    impl ArchiveHook for DenyDeepHook {
        fn name(&self) -> &str {
            "deny-deep"
        }

        fn before_zip_created(&self, ctx: &ArchiveContext<'_>) -> Result<(), String> {
            if ctx.paths.iter().any(|p| p.ends_with("/deep")) {
                return Err("deep is archived nightly".to_string());
            }
            Ok(())
        }
    }

    struct PlainPresenter;

    impl ErrorPresenter for PlainPresenter {
        fn present(
            &self,
            err: &DownloadError,
            out: &mut dyn ResponseWriter,
        ) -> std::io::Result<()> {
            out.head_mut().reset();
            out.head_mut().set_status(StatusCode::CONFLICT);
            write!(out, "{}", err.kind())?;
            out.finish()
        }
    }

    #[test]
    fn test_custom_hook_and_presenter() {
        let view = view();
        let mut orchestrator =
            orchestrator(view.clone(), &AppConfig::default()).with_presenter(Box::new(PlainPresenter));
        orchestrator.hooks_mut().register(Box::new(DenyDeepHook));
        assert_eq!(orchestrator.view().stat("/docs/notes.txt").unwrap().size, 700);

        let mut out = BufferedResponse::new();
        let outcome = orchestrator.serve(&request("/docs", "deep"), &mut out);
        assert_eq!(
            outcome,
            DownloadOutcome::Failed {
                status: StatusCode::CONFLICT,
                kind: "forbidden"
            }
        );
        assert_eq!(out.body(), b"forbidden");
        assert_eq!(view.lock_table().locked_paths(), 0);
    }

    fn fault_targets() -> Vec<&'static str> {
        vec![
            "report.pdf",
            "deep",
            r#"["deep","notes.txt","deep/a","deep"]"#,
        ]
    }

    proptest! {
        #[test]
        fn prop_locks_balanced_under_write_faults(limit in 0usize..12_000, idx in 0usize..3) {
            let view = view();
            let orchestrator = orchestrator(view.clone(), &AppConfig::default());
            let mut out = FailingResponse::new(limit);

            orchestrator.serve(&request("/docs", fault_targets()[idx]), &mut out);

            prop_assert!(view.lock_calls() > 0);
            prop_assert_eq!(view.lock_calls(), view.unlock_calls());
            prop_assert_eq!(view.lock_table().locked_paths(), 0);
        }
    }
}
