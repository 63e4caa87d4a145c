//! multipart/form-data 解析
//!
//! 只处理浏览器上传所需的子集：按边界切分，读取每个部分的 `filename`，
//! 正文原样保留（不做传输编码解码）。

use std::sync::LazyLock;

use regex::Regex;

use crate::http::request::find;

/// 部分缺少文件名时使用的名称
pub const DEFAULT_FILENAME: &str = "upload.bin";

static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[;\s])filename=(?:"([^"]*)"|([^;\r\n]*))"#)
        .unwrap_or_else(|e| panic!("invalid filename pattern: {e}"))
});

/// 上传中的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part<'a> {
    pub filename: String,
    pub data: &'a [u8],
}

/// 从 `Content-Type` 中提取边界
///
/// 支持带引号的值；不带引号时截止到 `;`。
pub fn boundary(content_type: &str) -> Option<String> {
    let start = content_type.find("boundary=")? + "boundary=".len();
    let token = content_type[start..].trim_start_matches(' ');
    let token = match token.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or(quoted),
        None => token.split(';').next().unwrap_or(token),
    };
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// 部分头部中的文件名
pub fn filename(part_headers: &str) -> Option<String> {
    let caps = FILENAME_PATTERN.captures(part_headers)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// 按边界切分正文
///
/// 遇到结束标记或结构不完整的部分时停止。
pub fn parse<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{boundary}").into_bytes();
    let next_delimiter = format!("\r\n--{boundary}").into_bytes();

    let mut parts = Vec::new();
    let mut pos = 0;
    while let Some(found) = find(body, &delimiter, pos) {
        pos = found + delimiter.len();
        if body[pos..].starts_with(b"\r\n") {
            pos += 2;
        }
        if body[pos..].starts_with(b"--") {
            break;
        }

        let Some(headers_end) = find(body, b"\r\n\r\n", pos) else {
            break;
        };
        let headers = String::from_utf8_lossy(&body[pos..headers_end]);
        let data_start = headers_end + 4;
        let Some(data_end) = find(body, &next_delimiter, data_start) else {
            break;
        };

        parts.push(Part {
            filename: filename(&headers).unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            data: &body[data_start..data_end],
        });
        pos = data_end;
    }
    parts
}
