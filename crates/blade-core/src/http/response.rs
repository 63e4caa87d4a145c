//! 响应构造
//!
//! 每个响应都带 `Connection: close` 和禁止缓存的头部。

use serde::Serialize;

const NO_CACHE: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

const NOT_FOUND_HTML: &str = "<html><body><h1>404 Not Found</h1></body></html>";

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.header("Content-Type", content_type)
    }

    pub fn text(status: u16, text: &str) -> Self {
        Self::new(status).body("text/plain", text)
    }

    /// JSON 响应；序列化失败时退化为 500
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status).body("application/json", body),
            Err(_) => Self::text(500, "ERROR"),
        }
    }

    pub fn not_found() -> Self {
        Self::new(404).body("text/html", NOT_FOUND_HTML)
    }

    /// 允许跨域访问
    pub fn with_cors(self) -> Self {
        self.header("Access-Control-Allow-Origin", "*")
    }

    /// OPTIONS 预检响应
    pub fn preflight() -> Self {
        Self::new(204)
            .with_cors()
            .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type, Content-Length, Authorization, X-Requested-With",
            )
            .header("Access-Control-Max-Age", "86400")
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 只有头部，正文长度由调用方给出（用于流式下载）
    pub fn head_bytes(&self, content_length: u64) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status));
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!("Content-Length: {content_length}\r\n"));
        for (name, value) in NO_CACHE {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.head_bytes(self.body.len() as u64);
        out.extend_from_slice(&self.body);
        out
    }
}
