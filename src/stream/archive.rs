// 打包下载
//
// 边读边写 ZIP，不在磁盘或内存中生成完整压缩包。
// 流程：预扫描 -> 前置检查 -> 发送响应头 -> 逐条目写出 -> 中央目录

use std::collections::HashSet;
use std::io::Write;
use std::time::{Duration, SystemTime};

use axum::http::{header, StatusCode};
use chrono::{Datelike, Local, Timelike};
use tracing::{debug, info, warn};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::copy_range;
use super::headers::{
    content_disposition, LegacyAgents, CONTENT_TRANSFER_ENCODING, X_ACCEL_BUFFERING,
    X_ARCHIVE_FILE_COUNT,
};
use super::response::ResponseWriter;
use super::session::StreamSession;
use crate::download::{ArchiveContext, ArchiveHooks, DownloadError};
use crate::filesystem::{FileStat, FilesystemView, FsErrorCode};

/// 单个条目或总大小达到该值时使用 ZIP64
pub const ZIP64_SIZE_THRESHOLD: u64 = u32::MAX as u64;
/// 条目数达到该值时使用 ZIP64
pub const ZIP64_ENTRY_THRESHOLD: u64 = u16::MAX as u64;

type ArchiveWriter<'w> = ZipWriter<StreamWriter<&'w mut dyn ResponseWriter>>;

/// 打包任务
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    /// 请求所在目录
    pub dir: String,
    /// 打包的根条目（视图路径）
    pub paths: Vec<String>,
    /// 压缩包文件名（不含 `.zip`）
    pub archive_name: String,
}

/// 打包结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// 预扫描的文件总大小
    pub total_size: u64,
    /// 预扫描的文件与文件夹数量
    pub number_of_files: u64,
    /// 实际写入的条目数
    pub entries: u64,
    /// 因权限等原因跳过的条目数
    pub skipped: u64,
    /// 写入的文件字节数
    pub bytes: u64,
    pub zip64: bool,
}

/// 统计文件与文件夹数量（含请求的根条目）
///
/// 仅用于客户端进度显示，无法列出的目录按空目录计
pub fn number_of_files(view: &dyn FilesystemView, roots: &[FileStat]) -> u64 {
    scan_tree(view, roots).1
}

/// 预扫描：返回 (文件总大小, 文件与文件夹数量)
fn scan_tree(view: &dyn FilesystemView, roots: &[FileStat]) -> (u64, u64) {
    let mut total_size = 0u64;
    let mut count = 0u64;
    let mut stack: Vec<FileStat> = roots.to_vec();

    while let Some(info) = stack.pop() {
        count += 1;
        if info.is_dir() {
            match view.list_dir(&info.path) {
                Ok(children) => stack.extend(children),
                Err(e) => debug!("预扫描时无法列出目录 {}: {}", info.path, e),
            }
        } else {
            total_size = total_size.saturating_add(info.size);
        }
    }

    (total_size, count)
}

/// 打包期间解除执行时间限制并忽略客户端断开，离开作用域时恢复原值（含 panic）
struct ExtendedExecution<'w> {
    out: &'w mut dyn ResponseWriter,
    time_limit: Option<Duration>,
    ignore_client_abort: bool,
}

impl<'w> ExtendedExecution<'w> {
    fn begin(out: &'w mut dyn ResponseWriter) -> Self {
        let time_limit = out.set_time_limit(None);
        let ignore_client_abort = out.set_ignore_client_abort(true);
        Self {
            out,
            time_limit,
            ignore_client_abort,
        }
    }

    fn out(&mut self) -> &mut dyn ResponseWriter {
        &mut *self.out
    }
}

impl Drop for ExtendedExecution<'_> {
    fn drop(&mut self) {
        self.out.set_time_limit(self.time_limit);
        self.out.set_ignore_client_abort(self.ignore_client_abort);
    }
}

/// ZIP 流式输出
pub struct ArchiveStreamer<'a> {
    view: &'a dyn FilesystemView,
    hooks: &'a ArchiveHooks,
    legacy_agents: &'a LegacyAgents,
    chunk_size: usize,
}

impl<'a> ArchiveStreamer<'a> {
    pub fn new(
        view: &'a dyn FilesystemView,
        hooks: &'a ArchiveHooks,
        legacy_agents: &'a LegacyAgents,
        chunk_size: usize,
    ) -> Self {
        Self {
            view,
            hooks,
            legacy_agents,
            chunk_size,
        }
    }

    pub fn stream(
        &self,
        job: &ArchiveJob,
        session: &StreamSession,
        out: &mut dyn ResponseWriter,
    ) -> Result<ArchiveSummary, DownloadError> {
        let roots = job
            .paths
            .iter()
            .map(|path| self.view.stat(path))
            .collect::<Result<Vec<_>, _>>()?;

        let (total_size, number_of_files) = scan_tree(self.view, &roots);
        let zip64 = total_size >= ZIP64_SIZE_THRESHOLD || number_of_files >= ZIP64_ENTRY_THRESHOLD;
        let mut summary = ArchiveSummary {
            total_size,
            number_of_files,
            zip64,
            ..Default::default()
        };

        let ctx = ArchiveContext {
            dir: &job.dir,
            paths: &job.paths,
            total_size,
            number_of_files,
        };
        self.hooks
            .dispatch(&ctx)
            .map_err(|reason| DownloadError::vetoed(job.dir.clone(), reason))?;

        self.send_headers(job, number_of_files, session, out);
        if session.head_request {
            return Ok(summary);
        }

        info!(
            "开始打包: {}.zip, {} 个条目, {} 字节{}",
            job.archive_name,
            number_of_files,
            total_size,
            if zip64 { " (ZIP64)" } else { "" }
        );

        {
            let mut scope = ExtendedExecution::begin(out);
            self.write_archive(&roots, zip64, &mut summary, scope.out())?;
        }

        if summary.skipped > 0 {
            warn!("打包完成，跳过 {} 个无法读取的条目", summary.skipped);
        }
        Ok(summary)
    }

    fn send_headers(
        &self,
        job: &ArchiveJob,
        number_of_files: u64,
        session: &StreamSession,
        out: &mut dyn ResponseWriter,
    ) {
        let legacy = self.legacy_agents.matches(session.user_agent.as_deref());
        let head = out.head_mut();

        head.set_status(StatusCode::OK);
        head.insert(header::CONTENT_TYPE, "application/zip");
        head.insert(
            header::CONTENT_DISPOSITION,
            &content_disposition(&format!("{}.zip", job.archive_name), legacy),
        );
        head.insert(CONTENT_TRANSFER_ENCODING, "binary");
        head.insert(header::PRAGMA, "public");
        head.insert(header::EXPIRES, "0");
        head.insert(header::CACHE_CONTROL, "public, must-revalidate");
        head.remove(&header::CONTENT_LENGTH);
        head.insert(X_ARCHIVE_FILE_COUNT, &number_of_files.to_string());
        head.insert(X_ACCEL_BUFFERING, "no");
    }

    fn write_archive(
        &self,
        roots: &[FileStat],
        zip64: bool,
        summary: &mut ArchiveSummary,
        out: &mut dyn ResponseWriter,
    ) -> Result<(), DownloadError> {
        let mut zip: ArchiveWriter<'_> = ZipWriter::new_stream(out);

        // 条目名相对于根条目的父目录，深度优先
        let mut stack: Vec<(FileStat, String)> = roots
            .iter()
            .rev()
            .map(|stat| (stat.clone(), stat.name.clone()))
            .collect();

        // 同名条目只写第一个
        let mut written: HashSet<String> = HashSet::new();

        while let Some((stat, name)) = stack.pop() {
            let entry_name = if stat.is_dir() {
                format!("{}/", name)
            } else {
                name.clone()
            };
            if !written.insert(entry_name) {
                warn!("压缩包中已有同名条目，已跳过: {}", name);
                summary.skipped += 1;
                continue;
            }

            if stat.is_dir() {
                zip.add_directory(format!("{}/", name), entry_options(&stat, false, 0o755))?;
                summary.entries += 1;

                match self.view.list_dir(&stat.path) {
                    Ok(children) => stack.extend(children.into_iter().rev().map(|child| {
                        let child_name = format!("{}/{}", name, child.name);
                        (child, child_name)
                    })),
                    Err(e) if e.code == FsErrorCode::PermissionDenied => {
                        warn!("无权限读取目录，已跳过其内容: {}", stat.path);
                        summary.skipped += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            } else if stat.is_file() {
                self.add_file(&mut zip, &stat, &name, zip64, summary)?;
            } else {
                warn!("跳过非普通文件: {}", stat.path);
                summary.skipped += 1;
            }
        }

        let mut sink = zip.finish()?;
        sink.flush()?;
        Ok(())
    }

    fn add_file(
        &self,
        zip: &mut ArchiveWriter<'_>,
        stat: &FileStat,
        name: &str,
        zip64: bool,
        summary: &mut ArchiveSummary,
    ) -> Result<(), DownloadError> {
        if !stat.readable {
            warn!("无权限读取文件，已跳过: {}", stat.path);
            summary.skipped += 1;
            return Ok(());
        }

        let mut handle = match self.view.open_read(&stat.path) {
            Ok(handle) => handle,
            Err(e) if e.code == FsErrorCode::PermissionDenied => {
                warn!("无权限读取文件，已跳过: {}", stat.path);
                summary.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let large = zip64 || stat.size >= ZIP64_SIZE_THRESHOLD;
        zip.start_file(name, entry_options(stat, large, 0o644))?;
        let copied = copy_range(&mut handle, zip, u64::MAX, self.chunk_size)?;
        if copied != stat.size {
            warn!(
                "文件大小在打包过程中变化: {} (预期 {}, 实际 {})",
                stat.path, stat.size, copied
            );
        }

        summary.entries += 1;
        summary.bytes += copied;
        Ok(())
    }
}

fn entry_options(stat: &FileStat, large: bool, permissions: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip_time(stat.modified))
        .large_file(large)
        .unix_permissions(permissions)
}

/// 转换为 ZIP 的本地时间，超出 1980-2107 范围时取默认值
fn zip_time(modified: Option<SystemTime>) -> DateTime {
    let Some(modified) = modified else {
        return DateTime::default();
    };
    let local: chrono::DateTime<Local> = modified.into();
    u16::try_from(local.year())
        .ok()
        .and_then(|year| {
            DateTime::from_date_and_time(
                year,
                local.month() as u8,
                local.day() as u8,
                local.hour() as u8,
                local.minute() as u8,
                local.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}
