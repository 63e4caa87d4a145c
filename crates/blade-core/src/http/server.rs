//! HTTP 协议引擎
//!
//! 每个连接只处理一个请求：读取头部 → 路由 → 发送响应 → 关闭。
//! 业务状态（设备表、待下载队列、上传落盘）通过 [`TransferHandler`] 访问。

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::io::AsyncReadExt;
use tokio_util::task::TaskTracker;

use crate::config::{Limits, Timeouts};
use crate::http::request::{Request, read_body, read_head};
use crate::http::response::Response;
use crate::http::routes::{Route, RouteTable};
use crate::http::{multipart, static_files};
use crate::logging::Logger;
use crate::net::{Connection, Listener, is_local_peer};
use crate::transfer::progress::PercentTracker;
use crate::transfer::protocol::{
    AnnounceRequest, AuthConfig, DevicesResponse, PendingFile, PendingFilesResponse,
    StatusResponse,
};
use crate::transfer::queue::display_name;

/// 下载分块大小
pub const DOWNLOAD_CHUNK: usize = 256 * 1024;

/// RFC 5987 attr-char 以外的字符都需要编码
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// 引擎与传输编排层之间的接口
#[async_trait]
pub trait TransferHandler: Send + Sync {
    /// 被跟踪的 HTTP 连接（已排除本机）
    fn track_connection(&self, ip: &str);

    fn heartbeat(&self, ip: &str);

    /// 保存一个上传的文件
    async fn upload(&self, filename: &str, data: &[u8]) -> bool;

    fn announce(&self, filename: &str, size: u64);

    fn auth_config(&self) -> AuthConfig;

    fn connected_devices(&self) -> Vec<String>;

    fn pending_files(&self) -> Vec<PendingFile>;

    fn pending_file(&self, index: usize) -> Option<PathBuf>;

    fn outgoing_progress(&self, path: &Path, percent: u8);

    /// 下载结束（无论成功与否）后文件出队
    fn download_finished(&self, path: &Path, ok: bool);
}

/// HTTP 协议引擎
pub struct HttpEngine {
    handler: Arc<dyn TransferHandler>,
    web_root: PathBuf,
    limits: Limits,
    timeouts: Timeouts,
    own_ip: String,
    logger: Logger,
}

impl HttpEngine {
    pub fn new(
        handler: Arc<dyn TransferHandler>,
        web_root: PathBuf,
        limits: Limits,
        timeouts: Timeouts,
        own_ip: String,
        logger: Logger,
    ) -> Self {
        Self {
            handler,
            web_root,
            limits,
            timeouts,
            own_ip,
            logger,
        }
    }

    /// accept 循环，`running` 被清除后在一个轮询周期内退出
    pub async fn run(
        self: Arc<Self>,
        listener: Listener,
        running: Arc<AtomicBool>,
        tracker: TaskTracker,
    ) {
        self.logger
            .info(format_args!("HTTP server listening on port {}", listener.port()));

        while running.load(Ordering::SeqCst) {
            match listener.accept_with_timeout(self.timeouts.accept_poll()).await {
                Ok(Some((stream, peer))) => {
                    let engine = Arc::clone(&self);
                    let conn = Connection::new(stream, peer, self.timeouts.request());
                    tracker.spawn(async move { engine.handle_connection(conn).await });
                }
                Ok(None) => {}
                Err(e) => self.logger.warn(format_args!("HTTP accept failed: {}", e)),
            }
        }
        self.logger.debug(format_args!("HTTP server stopped"));
    }

    /// 处理一个连接上的单个请求
    pub async fn handle_connection(&self, mut conn: Connection) {
        let ip = conn.peer_ip();
        if !is_local_peer(&ip, &self.own_ip) {
            self.handler.track_connection(&ip);
        }

        if let Err(e) = self.serve(&mut conn, &ip).await {
            self.logger
                .debug(format_args!("Connection from {} aborted: {}", ip, e));
        }
        conn.close().await;
    }

    async fn serve(&self, conn: &mut Connection, ip: &str) -> io::Result<()> {
        let Some(request) = read_head(conn, self.limits.max_header_bytes).await? else {
            return Ok(());
        };
        self.logger
            .debug(format_args!("{} {} from {}", request.method, request.path, ip));

        let response = match RouteTable::resolve(&request.method, &request.path) {
            Route::Preflight => Some(Response::preflight()),
            Route::Upload => self.upload(conn, &request).await?,
            Route::Announce => self.announce(conn, &request).await?,
            Route::Heartbeat => {
                self.handler.heartbeat(ip);
                Some(Response::json(200, &StatusResponse::ok()).with_cors())
            }
            Route::AuthConfig => {
                let config = self.handler.auth_config();
                Some(Response::json(200, &config))
            }
            Route::ConnectedDevices => Some(Response::json(
                200,
                &DevicesResponse {
                    devices: self.handler.connected_devices(),
                },
            )),
            Route::PendingFiles => Some(
                Response::json(
                    200,
                    &PendingFilesResponse {
                        files: self.handler.pending_files(),
                    },
                )
                .with_cors(),
            ),
            Route::Download { index } => {
                return self.download(conn, index).await;
            }
            Route::Static(path) => Some(self.static_file(&path).await),
            Route::NotFound => Some(Response::not_found()),
        };

        match response {
            Some(response) => conn.send_all(&response.to_bytes()).await,
            None => Ok(()),
        }
    }

    /// multipart 上传；请求格式错误时不响应直接关闭
    async fn upload(
        &self,
        conn: &mut Connection,
        request: &Request,
    ) -> io::Result<Option<Response>> {
        let Some(len) = request.content_length() else {
            return Ok(None);
        };
        if len > self.limits.max_upload_bytes {
            self.logger.warn(format_args!(
                "Rejecting upload of {} bytes (limit {})",
                len, self.limits.max_upload_bytes
            ));
            return Ok(None);
        }
        let Ok(len) = usize::try_from(len) else {
            return Ok(None);
        };
        let Some(body) = read_body(conn, request, len).await? else {
            return Ok(None);
        };
        let Some(boundary) = multipart::boundary(request.header("Content-Type")) else {
            return Ok(None);
        };

        let mut any_ok = false;
        for part in multipart::parse(&body, &boundary) {
            if self.handler.upload(&part.filename, part.data).await {
                any_ok = true;
            }
        }

        let response = if any_ok {
            Response::text(200, "OK")
        } else {
            Response::text(500, "ERROR")
        };
        Ok(Some(response.with_cors()))
    }

    async fn announce(
        &self,
        conn: &mut Connection,
        request: &Request,
    ) -> io::Result<Option<Response>> {
        let len = match request.content_length() {
            Some(len) => usize::try_from(len).unwrap_or(usize::MAX),
            None => request.body_prefix.len(),
        };
        let error = Response::json(400, &StatusResponse::error()).with_cors();
        if len > self.limits.max_announce_bytes {
            return Ok(Some(error));
        }
        let Some(body) = read_body(conn, request, len).await? else {
            return Ok(None);
        };

        Ok(Some(match AnnounceRequest::parse(&body) {
            Some(announce) => {
                self.handler.announce(&announce.filename, announce.size);
                Response::json(200, &StatusResponse::ok()).with_cors()
            }
            None => error,
        }))
    }

    async fn static_file(&self, request_path: &str) -> Response {
        let Some(path) = static_files::resolve(&self.web_root, request_path) else {
            return Response::not_found();
        };
        match static_files::load(&path, self.limits.max_static_file_bytes).await {
            Ok(Some(content)) => static_files::file_response(&path, content),
            Ok(None) => Response::not_found(),
            Err(e) => {
                self.logger
                    .warn(format_args!("Failed to read {}: {}", path.display(), e));
                Response::not_found()
            }
        }
    }

    /// 流式发送待下载文件
    async fn download(&self, conn: &mut Connection, index: usize) -> io::Result<()> {
        let Some(path) = self.handler.pending_file(index) else {
            return conn.send_all(&Response::not_found().to_bytes()).await;
        };

        let opened = match tokio::fs::File::open(&path).await {
            Ok(file) => file.metadata().await.map(|meta| (file, meta.len())),
            Err(e) => Err(e),
        };
        let (mut file, size) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.logger.warn(format_args!(
                    "Pending file {} unavailable: {}",
                    path.display(),
                    e
                ));
                self.handler.download_finished(&path, false);
                return conn.send_all(&Response::not_found().to_bytes()).await;
            }
        };

        conn.set_timeout(self.timeouts.download());
        let ok = match self.stream_file(conn, &mut file, &path, size).await {
            Ok(()) => {
                self.logger
                    .info(format_args!("Sent {} ({} bytes)", path.display(), size));
                true
            }
            Err(e) => {
                self.logger
                    .warn(format_args!("Download of {} failed: {}", path.display(), e));
                false
            }
        };
        self.handler.download_finished(&path, ok);
        Ok(())
    }

    async fn stream_file(
        &self,
        conn: &mut Connection,
        file: &mut tokio::fs::File,
        path: &Path,
        size: u64,
    ) -> io::Result<()> {
        let head = Response::new(200)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Disposition", content_disposition(&display_name(path)))
            .with_cors()
            .head_bytes(size);
        conn.send_all(&head).await?;

        // 入队时已上报 0%
        let mut tracker = PercentTracker::after(size, 0);
        let mut buf = vec![0u8; DOWNLOAD_CHUNK];
        let mut sent = 0u64;
        while sent < size {
            let n = fill_chunk(file, &mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file shrank during download",
                ));
            }
            conn.send_all(&buf[..n]).await?;
            sent += n as u64;
            if let Some(pct) = tracker.update(sent) {
                self.handler.outgoing_progress(path, pct);
            }
        }

        if size == 0 {
            if let Some(pct) = tracker.update(0) {
                self.handler.outgoing_progress(path, pct);
            }
        }
        Ok(())
    }
}

/// 读满一个分块，文件结束时返回不足一块的长度
async fn fill_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// `attachment; filename="…"; filename*=UTF-8''…`
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(name, ATTR_CHAR)
    )
}
