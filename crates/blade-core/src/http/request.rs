//! 请求解析
//!
//! 先读到 `\r\n\r\n`，再按需读取正文。同一次读取中落在头部之后的字节保存在
//! [`Request::body_prefix`] 中。

use std::io;

use crate::net::Connection;

/// 已解析的请求头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// 不含 `?query`
    pub path: String,
    head: String,
    pub body_prefix: Vec<u8>,
}

impl Request {
    /// 解析包含完整头部的原始字节，请求行不完整时返回 `None`
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let head_end = find(raw, b"\r\n\r\n", 0)?;
        let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();

        let request_line = head.split("\r\n").next()?;
        let mut parts = request_line.split(' ');
        let method = parts.next().filter(|m| !m.is_empty())?.to_string();
        let target = parts.next()?;
        // 至少还要有协议版本
        parts.next()?;

        let path = match target.split_once('?') {
            Some((path, _)) => path.to_string(),
            None => target.to_string(),
        };

        Some(Self {
            method,
            path,
            head,
            body_prefix: raw[head_end + 4..].to_vec(),
        })
    }

    /// 按名称精确查找头部，值去掉前导空格；不存在时返回空串
    pub fn header(&self, name: &str) -> &str {
        self.head
            .split("\r\n")
            .skip(1)
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
            .map(|value| value.trim_start_matches(' '))
            .unwrap_or("")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").trim().parse().ok()
    }
}

/// 在 `hay[start..]` 中查找 `needle`，返回绝对位置
pub fn find(hay: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start > hay.len() {
        return None;
    }
    hay[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start + pos)
}

/// 读取请求头
///
/// 超过 `max_bytes` 仍未见到头部结束符，或对端先关闭，返回 `Ok(None)`。
pub async fn read_head(conn: &mut Connection, max_bytes: usize) -> io::Result<Option<Request>> {
    let mut raw = Vec::with_capacity(8192);
    let mut scanned = 0;
    loop {
        if find(&raw, b"\r\n\r\n", scanned).is_some() {
            return Ok(Request::parse(&raw));
        }
        if raw.len() > max_bytes {
            return Ok(None);
        }
        // 上一轮末尾的 3 个字节可能是结束符的前半部分
        scanned = raw.len().saturating_sub(3);
        if conn.receive_into(&mut raw).await? == 0 {
            return Ok(None);
        }
    }
}

/// 读取恰好 `len` 字节的正文；对端提前关闭返回 `Ok(None)`
pub async fn read_body(
    conn: &mut Connection,
    request: &Request,
    len: usize,
) -> io::Result<Option<Vec<u8>>> {
    let mut body = request.body_prefix.clone();
    while body.len() < len {
        if conn.receive_into(&mut body).await? == 0 {
            return Ok(None);
        }
    }
    body.truncate(len);
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"POST /api/upload?t=123 HTTP/1.1\r\n\
Host: 192.168.1.2\r\n\
Content-Type:   multipart/form-data; boundary=xyz\r\n\
Content-Length: 11\r\n\
\r\n\
hello";

    #[test]
    fn test_parse_request_line() {
        let req = Request::parse(RAW).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/upload");
        assert_eq!(req.body_prefix, b"hello");
    }

    #[test]
    fn test_header_lookup_is_exact() {
        let req = Request::parse(RAW).unwrap();
        assert_eq!(req.header("Content-Type"), "multipart/form-data; boundary=xyz");
        assert_eq!(req.header("Content-Length"), "11");
        assert_eq!(req.content_length(), Some(11));
        assert_eq!(req.header("content-length"), "");
        assert_eq!(req.header("Missing"), "");
        // 请求行不参与头部匹配
        assert_eq!(req.header("POST /api/upload?t=123 HTTP/1.1"), "");
    }

    #[test]
    fn test_malformed_request_line() {
        assert!(Request::parse(b"GARBAGE\r\n\r\n").is_none());
        assert!(Request::parse(b"GET /\r\n\r\n").is_none());
        assert!(Request::parse(b"GET / HTTP/1.1\r\n").is_none());
    }

    #[test]
    fn test_find() {
        assert_eq!(find(b"abcabc", b"bc", 0), Some(1));
        assert_eq!(find(b"abcabc", b"bc", 2), Some(4));
        assert_eq!(find(b"abc", b"", 0), None);
        assert_eq!(find(b"abc", b"c", 9), None);
    }
}
