// 单次响应的流式会话状态

/// 流式会话
///
/// 每个响应独立生成 multipart 分隔符，同一响应内的所有分段共用一个
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// 是否为 HEAD 请求
    pub head_request: bool,
    /// multipart/byteranges 分隔符
    pub boundary: String,
    /// 原始 Range 请求头
    pub range_header: Option<String>,
    /// 客户端 User-Agent
    pub user_agent: Option<String>,
}

impl StreamSession {
    pub fn new(head_request: bool, range_header: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            head_request,
            boundary: generate_boundary(),
            range_header,
            user_agent,
        }
    }
}

/// 随机种子的 MD5 十六进制摘要
pub fn generate_boundary() -> String {
    let seed: u64 = rand::random();
    format!("{:x}", md5::compute(seed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_md5_hex() {
        let boundary = generate_boundary();
        assert_eq!(boundary.len(), 32);
        assert!(boundary.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_each_session_has_own_boundary() {
        let a = StreamSession::new(false, None, None);
        let b = StreamSession::new(false, None, None);
        assert_ne!(a.boundary, b.boundary);
    }
}
