// 响应流式输出模块

mod archive;
mod headers;
mod response;
mod session;
mod single;

use std::io::{self, Read, Write};

pub use archive::{
    number_of_files, ArchiveJob, ArchiveStreamer, ArchiveSummary, ZIP64_ENTRY_THRESHOLD,
    ZIP64_SIZE_THRESHOLD,
};
pub use headers::{
    content_disposition, is_valid_download_secret, set_download_started_cookie,
    set_no_cache_headers, LegacyAgents, CONTENT_TRANSFER_ENCODING, DOWNLOAD_STARTED_COOKIE,
    X_ACCEL_BUFFERING, X_ARCHIVE_FILE_COUNT,
};
pub use response::{fits_content_length, BufferedResponse, ExecutionClock, ResponseHead, ResponseWriter};
pub use session::{generate_boundary, StreamSession};
pub use single::{SingleFileOutcome, SingleFileStreamer};

/// 按块复制至多 `len` 字节，源提前结束时返回实际字节数
pub(crate) fn copy_range<R, W>(reader: &mut R, out: &mut W, len: u64, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let buf_len = (chunk_size.max(1) as u64).min(len.max(1)) as usize;
    let mut buf = vec![0u8; buf_len];
    let mut remaining = len;
    let mut copied = 0u64;

    while remaining > 0 {
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..n])?;
        remaining -= n as u64;
        copied += n as u64;
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_range_limits_length() {
        let data: Vec<u8> = (0..100).collect();
        let mut out = Vec::new();
        let copied = copy_range(&mut data.as_slice(), &mut out, 30, 7).unwrap();
        assert_eq!(copied, 30);
        assert_eq!(out, &data[..30]);
    }

    #[test]
    fn test_copy_range_stops_at_eof() {
        let data = b"short".to_vec();
        let mut out = Vec::new();
        let copied = copy_range(&mut data.as_slice(), &mut out, u64::MAX, 512 * 1024).unwrap();
        assert_eq!(copied, 5);
        assert_eq!(out, b"short");
    }
}
