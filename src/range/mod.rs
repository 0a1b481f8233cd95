//! HTTP Range 请求头解析
//!
//! 将 `Range: bytes=...` 解析为有序、不重叠的字节区间列表。
//! 解析结果为空表示回退到完整响应体。
//!
//! 区间的合并与截断规则与请求顺序相关：
//! - 起点落在上一区间内时，被抬高到上一区间末尾之后（`500-700,601-999` → 第二段从 701 开始）
//! - `x-y` 形式的起点紧接上一区间末尾时，与上一区间合并（`500-600,601-999` → `500-999`）；
//!   `x-` 与 `-y` 形式只做截断，总是作为新区间追加（`0-99,100-` 得到两段）
//! - `x-` 与 `-y` 两种形式都会终止后续解析

use std::fmt;

/// Range 请求头前缀
pub const BYTES_UNIT_PREFIX: &str = "bytes=";

/// 单个字节区间（闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// 起始偏移
    pub from: u64,
    /// 结束偏移（包含）
    pub to: u64,
    /// 请求时资源的总大小
    pub size: u64,
}

impl ByteRange {
    /// 区间字节数
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// `Content-Range` 头的值，如 `bytes 0-499/2000`
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.from, self.to, self.size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// 解析完整的 Range 头
///
/// 只有以字面量 `bytes=` 开头的值才会被解析，其余一律视为未请求区间。
pub fn parse_range_header(header: &str, size: u64) -> Vec<ByteRange> {
    match header.strip_prefix(BYTES_UNIT_PREFIX) {
        Some(list) => parse_byte_ranges(list, size),
        None => Vec::new(),
    }
}

/// 解析 `bytes=` 之后的区间列表
///
/// # 参数
/// - `list`: 逗号分隔的区间描述，如 `500-999,1000-1499`
/// - `size`: 资源总大小
pub fn parse_byte_ranges(list: &str, size: u64) -> Vec<ByteRange> {
    let mut ranges: Vec<ByteRange> = Vec::new();
    if size == 0 {
        return ranges;
    }

    // 上一个已接受区间的开区间上界（prev.to + 1）
    let mut min_offset: u64 = 0;

    for part in list.split(',') {
        let (start_str, end_str) = match part.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (part.trim(), ""),
        };
        let start = parse_offset(start_str);
        let end = parse_offset(end_str);

        match (start, end) {
            // x-y
            (Some(from), Some(to)) => {
                let from = from.max(min_offset);
                if from >= size || from > to {
                    continue;
                }
                let to = to.min(size - 1);
                push_or_merge(&mut ranges, from, to, size);
                min_offset = to + 1;
                if min_offset >= size {
                    break;
                }
            }
            // x-
            (Some(from), None) => {
                let from = from.max(min_offset);
                if from >= size {
                    continue;
                }
                // 只截断不合并
                ranges.push(ByteRange { from, to: size - 1, size });
                break;
            }
            // -y
            (None, Some(suffix)) if start_str.is_empty() => {
                if suffix > 0 {
                    let from = size.saturating_sub(suffix).max(min_offset);
                    if from < size {
                        ranges.push(ByteRange { from, to: size - 1, size });
                    }
                }
                break;
            }
            _ => continue,
        }
    }

    ranges
}

/// 追加 `x-y` 区间；与上一区间首尾相接时合并
fn push_or_merge(ranges: &mut Vec<ByteRange>, from: u64, to: u64, size: u64) {
    if let Some(last) = ranges.last_mut() {
        if last.to.checked_add(1) == Some(from) {
            last.to = last.to.max(to);
            return;
        }
    }
    ranges.push(ByteRange { from, to, size });
}

/// 纯数字才视为偏移量，超出 u64 的值饱和处理
fn parse_offset(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(value.parse::<u64>().unwrap_or(u64::MAX))
}
