//! 传输编排
//!
//! [`TransferServer`] 持有全部共享状态，负责启动 / 停止三个后台循环：
//! HTTP 引擎的 accept 循环、原始 socket 通道的 accept 循环、设备清理循环。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::auth::CredentialStore;
use crate::config::ServerSettings;
use crate::error::{Result, ServerError};
use crate::http::{HttpEngine, TransferHandler};
use crate::legacy::{ClientInfo, ConnectionRegistry, LegacyChannel};
use crate::logging::Logger;
use crate::net::{Listener, local_lan_address};
use crate::sync::Guarded;
use crate::transfer::devices::DeviceActivity;
use crate::transfer::progress::{AnnounceCallback, CallbackSlot, ProgressCallback};
use crate::transfer::protocol::{AuthConfig, PendingFile, StatusResponse};
use crate::transfer::queue::{PendingQueue, display_name};
use crate::transfer::upload::{create_unique, write_chunked};

/// 运行期状态，仅在 start 与 stop 之间存在
struct Lifecycle {
    running: Arc<AtomicBool>,
    loops: Vec<JoinHandle<()>>,
    http_port: u16,
    transfer_port: u16,
    own_ip: String,
}

/// 各组件共享的状态
struct Shared {
    settings: ServerSettings,
    credentials: Arc<CredentialStore>,
    registry: Arc<ConnectionRegistry>,
    devices: Arc<DeviceActivity>,
    pending: PendingQueue,
    download_dir: Guarded<Option<PathBuf>>,
    outgoing: CallbackSlot<ProgressCallback>,
    incoming: CallbackSlot<ProgressCallback>,
    announced: CallbackSlot<AnnounceCallback>,
    logger: Logger,
}

/// 传输服务器
pub struct TransferServer {
    shared: Arc<Shared>,
    lifecycle: Guarded<Option<Lifecycle>>,
    tracker: TaskTracker,
}

impl TransferServer {
    pub fn new(settings: ServerSettings) -> Self {
        Self::with_logger(settings, Logger::default())
    }

    pub fn with_logger(settings: ServerSettings, logger: Logger) -> Self {
        let credentials = Arc::new(CredentialStore::from_settings(&settings.auth));
        let devices = Arc::new(DeviceActivity::new(settings.timeouts.device_inactivity()));
        let initial_dir = settings.download_dir.clone();

        let server = Self {
            shared: Arc::new(Shared {
                settings,
                credentials,
                registry: Arc::new(ConnectionRegistry::new()),
                devices,
                pending: PendingQueue::new(),
                download_dir: Guarded::new(None),
                outgoing: CallbackSlot::new(),
                incoming: CallbackSlot::new(),
                announced: CallbackSlot::new(),
                logger: logger.scoped("blade::transfer"),
            }),
            lifecycle: Guarded::new(None),
            tracker: TaskTracker::new(),
        };

        if let Some(dir) = initial_dir {
            // 失败已记录日志，服务器仍可在之后重新设置目录
            let _ = server.set_download_directory(dir);
        }
        server
    }

    /// 绑定两个端口并启动后台循环
    ///
    /// 已在运行时返回 [`ServerError::AlreadyRunning`]，不产生任何副作用。
    pub fn start(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ServerError::NoRuntime);
        }

        let mut lifecycle = self.shared_lifecycle();
        if lifecycle.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let settings = &self.shared.settings;
        let backlog = settings.limits.backlog;
        let http_listener = Listener::bind(settings.http_port, backlog).map_err(|source| {
            ServerError::Bind {
                port: settings.http_port,
                source,
            }
        })?;
        let socket_listener =
            Listener::bind(settings.transfer_port, backlog).map_err(|source| ServerError::Bind {
                port: settings.transfer_port,
                source,
            })?;
        let http_port = http_listener.port();
        let transfer_port = socket_listener.port();

        let own_ip = local_lan_address().to_string();
        let running = Arc::new(AtomicBool::new(true));
        let logger = &self.shared.logger;

        let engine = Arc::new(HttpEngine::new(
            Arc::clone(&self.shared) as Arc<dyn TransferHandler>,
            settings.web_root.clone(),
            settings.limits,
            settings.timeouts,
            own_ip.clone(),
            logger.scoped("blade::http"),
        ));
        let channel = Arc::new(LegacyChannel::new(
            Arc::clone(&self.shared.registry),
            Arc::clone(&self.shared.credentials),
            Arc::clone(&self.shared.devices),
            settings.auth.is_enabled(),
            own_ip.clone(),
            settings.timeouts.request(),
            settings.timeouts.accept_poll(),
            logger.scoped("blade::legacy"),
        ));

        let loops = vec![
            tokio::spawn(engine.run(http_listener, Arc::clone(&running), self.tracker.clone())),
            tokio::spawn(channel.run(
                socket_listener,
                Arc::clone(&running),
                self.tracker.clone(),
            )),
            tokio::spawn(sweep_loop(Arc::clone(&self.shared), Arc::clone(&running))),
        ];

        logger.info(format_args!("BLADE server started"));
        logger.info(format_args!("Web interface: {}", pairing_url(&own_ip, http_port)));
        logger.info(format_args!("File transfer port: {}", transfer_port));
        logger.info(format_args!(
            "Authentication: {}",
            if settings.auth.is_enabled() {
                "ENABLED"
            } else {
                "DISABLED"
            }
        ));

        *lifecycle = Some(Lifecycle {
            running,
            loops,
            http_port,
            transfer_port,
            own_ip,
        });
        Ok(())
    }

    /// 停止后台循环并释放监听端口；未运行时什么也不做
    ///
    /// 正在处理的连接不会被等待，见 [`TransferServer::drain`]。
    pub async fn stop(&self) {
        let Some(lifecycle) = self.shared_lifecycle().take() else {
            return;
        };
        lifecycle.running.store(false, Ordering::SeqCst);
        for handle in lifecycle.loops {
            if let Err(e) = handle.await {
                self.shared
                    .logger
                    .warn(format_args!("Background loop ended abnormally: {}", e));
            }
        }
        self.shared.logger.info(format_args!("Server stopped"));
    }

    /// 等待在途连接处理完毕，超时返回 false
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        drained
    }

    pub fn is_running(&self) -> bool {
        self.shared_lifecycle().is_some()
    }

    /// 实际绑定的 HTTP 端口
    pub fn http_port(&self) -> Option<u16> {
        self.shared_lifecycle().as_ref().map(|l| l.http_port)
    }

    /// 实际绑定的原始 socket 端口
    pub fn transfer_port(&self) -> Option<u16> {
        self.shared_lifecycle().as_ref().map(|l| l.transfer_port)
    }

    /// 手机浏览器访问的地址
    pub fn pairing_url(&self) -> Option<String> {
        self.shared_lifecycle()
            .as_ref()
            .map(|l| pairing_url(&l.own_ip, l.http_port))
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.shared.credentials
    }

    /// 原始 socket 通道上仍打开的连接
    pub fn legacy_clients(&self) -> Vec<ClientInfo> {
        self.shared.registry.list_clients()
    }

    /// 设置上传保存目录，转为绝对路径并按需创建
    pub fn set_download_directory(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let logger = &self.shared.logger;
        let resolved = std::path::absolute(path.as_ref())
            .and_then(|abs| std::fs::create_dir_all(&abs).map(|()| abs))
            .map_err(|e| {
                logger.error(format_args!(
                    "Failed to set download directory {}: {}",
                    path.as_ref().display(),
                    e
                ));
                ServerError::Io(e)
            })?;

        self.shared.download_dir.replace(Some(resolved.clone()));
        logger.info(format_args!("Download directory set to: {}", resolved.display()));
        Ok(resolved)
    }

    pub fn download_directory(&self) -> Option<PathBuf> {
        self.shared.download_dir.snapshot()
    }

    /// 保存上传的文件，返回最终路径
    pub async fn handle_upload(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        self.shared.save_upload(filename, data).await
    }

    /// 将文件加入待下载队列，返回新加入的数量
    ///
    /// 没有活动设备时拒绝，队列保持不变。
    pub fn enqueue_downloads<I, P>(&self, paths: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let logger = &self.shared.logger;
        if !self.has_connected_clients() {
            logger.warn(format_args!("Cannot queue files: no connected devices"));
            return Err(ServerError::NoConnectedDevices);
        }

        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        let added = self.shared.pending.extend_unique(paths.iter().cloned());
        for path in &added {
            logger.info(format_args!("Queued file for download: {}", path.display()));
        }
        for path in &paths {
            self.shared.report_outgoing(path, 0);
        }
        Ok(added.len())
    }

    pub fn pending_files(&self) -> Vec<PathBuf> {
        self.shared.pending.paths()
    }

    pub fn remove_pending_file(&self, path: impl AsRef<Path>) -> bool {
        let removed = self.shared.pending.remove(path.as_ref());
        if removed {
            self.shared
                .logger
                .debug(format_args!("Removed pending file: {}", path.as_ref().display()));
        }
        removed
    }

    pub fn has_connected_clients(&self) -> bool {
        !self.shared.devices.is_empty()
    }

    pub fn connected_devices(&self) -> Vec<String> {
        self.shared.devices.devices()
    }

    /// 刷新设备活动时间，首次出现时记录日志
    pub fn track_http_connection(&self, ip: &str) {
        self.shared.touch_device(ip);
    }

    pub fn handle_heartbeat(&self, ip: &str) -> StatusResponse {
        self.shared.touch_device(ip);
        StatusResponse::ok()
    }

    /// 发送进度回调：(文件路径, 百分比)
    pub fn on_outgoing_progress(&self, callback: impl Fn(&str, u8) + Send + Sync + 'static) {
        self.shared.outgoing.set(Arc::new(callback));
    }

    /// 接收进度回调：(保存后的文件名, 百分比)
    pub fn on_incoming_progress(&self, callback: impl Fn(&str, u8) + Send + Sync + 'static) {
        self.shared.incoming.set(Arc::new(callback));
    }

    /// 文件预告回调：(文件名, 字节数)
    pub fn on_incoming_file_announced(
        &self,
        callback: impl Fn(&str, u64) + Send + Sync + 'static,
    ) {
        self.shared.announced.set(Arc::new(callback));
    }

    fn shared_lifecycle(&self) -> std::sync::MutexGuard<'_, Option<Lifecycle>> {
        self.lifecycle.lock()
    }
}

impl Shared {
    fn touch_device(&self, ip: &str) {
        if self.devices.touch(ip) {
            self.logger.info(format_args!("[HTTP CLIENT] {} connected", ip));
        }
    }

    fn report_outgoing(&self, path: &Path, percent: u8) {
        if let Some(callback) = self.outgoing.get() {
            callback(&path.to_string_lossy(), percent);
        }
    }

    async fn save_upload(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let Some(dir) = self.download_dir.snapshot() else {
            self.logger.warn(format_args!(
                "No download directory set; rejecting upload for {}",
                filename
            ));
            return Err(ServerError::NoDownloadDirectory);
        };

        let (mut file, path) = create_unique(&dir, filename).await.map_err(|e| {
            self.logger.error(format_args!(
                "Failed to open file for writing in {}: {}",
                dir.display(),
                e
            ));
            ServerError::Io(e)
        })?;

        let name = display_name(&path);
        let incoming = self.incoming.get();
        let written = write_chunked(&mut file, data, |pct| {
            if let Some(callback) = &incoming {
                callback(&name, pct);
            }
        })
        .await;

        match written {
            Ok(()) => {
                self.logger
                    .info(format_args!("Saved uploaded file: {}", path.display()));
                Ok(path)
            }
            Err(e) => {
                self.logger
                    .error(format_args!("Failed writing {}: {}", path.display(), e));
                Err(ServerError::Io(e))
            }
        }
    }
}

#[async_trait]
impl TransferHandler for Shared {
    fn track_connection(&self, ip: &str) {
        self.touch_device(ip);
    }

    fn heartbeat(&self, ip: &str) {
        self.touch_device(ip);
    }

    async fn upload(&self, filename: &str, data: &[u8]) -> bool {
        self.save_upload(filename, data).await.is_ok()
    }

    fn announce(&self, filename: &str, size: u64) {
        self.logger
            .info(format_args!("Incoming file announced: {} ({} bytes)", filename, size));
        if let Some(callback) = self.announced.get() {
            callback(filename, size);
        }
    }

    fn auth_config(&self) -> AuthConfig {
        AuthConfig::from_settings(&self.settings.auth)
    }

    fn connected_devices(&self) -> Vec<String> {
        self.devices.devices()
    }

    fn pending_files(&self) -> Vec<PendingFile> {
        let (entries, vanished) = self.pending.listing();
        for path in vanished {
            self.logger.debug(format_args!(
                "Removed pending file: {} (no longer exists)",
                path.display()
            ));
        }
        entries
            .into_iter()
            .map(|entry| PendingFile {
                index: entry.index,
                name: entry.name,
                size: entry.size,
            })
            .collect()
    }

    fn pending_file(&self, index: usize) -> Option<PathBuf> {
        self.pending.get(index)
    }

    fn outgoing_progress(&self, path: &Path, percent: u8) {
        self.report_outgoing(path, percent);
    }

    fn download_finished(&self, path: &Path, ok: bool) {
        if !ok {
            self.logger
                .warn(format_args!("Transfer of {} failed", path.display()));
        }
        if self.pending.remove(path) {
            self.logger
                .debug(format_args!("Removed pending file: {}", path.display()));
        }
    }
}

/// 周期性移除无活动的设备
async fn sweep_loop(shared: Arc<Shared>, running: Arc<AtomicBool>) {
    let interval = shared.settings.timeouts.sweep_interval();
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(interval).await;
        for ip in shared.devices.sweep() {
            shared
                .logger
                .info(format_args!("[HTTP CLIENT] {} disconnected (timeout)", ip));
        }
    }
}

fn pairing_url(ip: &str, port: u16) -> String {
    if port == 80 {
        format!("http://{ip}")
    } else {
        format!("http://{ip}:{port}")
    }
}
