//! 原始 socket 通道
//!
//! 与 HTTP 端口并存的次要通道：登记每个连接，向远端发送欢迎信息，
//! 然后按行处理 [`session`] 中定义的命令。

pub mod registry;
pub mod session;

pub use registry::{ClientId, ClientInfo, ConnectionRegistry};
pub use session::{Reply, handle_command, welcome_message};

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::task::TaskTracker;

use crate::auth::CredentialStore;
use crate::logging::Logger;
use crate::net::{Connection, Listener, is_local_peer};
use crate::transfer::devices::DeviceActivity;

/// 单行命令长度上限
const MAX_LINE: usize = 4096;

/// 原始 socket 通道
#[derive(Debug)]
pub struct LegacyChannel {
    registry: Arc<ConnectionRegistry>,
    credentials: Arc<CredentialStore>,
    devices: Arc<DeviceActivity>,
    auth_enabled: bool,
    own_ip: String,
    io_timeout: Duration,
    poll: Duration,
    logger: Logger,
}

impl LegacyChannel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        credentials: Arc<CredentialStore>,
        devices: Arc<DeviceActivity>,
        auth_enabled: bool,
        own_ip: String,
        io_timeout: Duration,
        poll: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            registry,
            credentials,
            devices,
            auth_enabled,
            own_ip,
            io_timeout,
            poll,
            logger,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// accept 循环，`running` 被清除后在一个轮询周期内退出
    pub async fn run(
        self: Arc<Self>,
        listener: Listener,
        running: Arc<AtomicBool>,
        tracker: TaskTracker,
    ) {
        self.logger.info(format_args!(
            "Socket channel listening on port {}",
            listener.port()
        ));

        while running.load(Ordering::SeqCst) {
            let (stream, peer) = match listener.accept_with_timeout(self.poll).await {
                Ok(Some(pair)) => pair,
                Ok(None) => continue,
                Err(e) => {
                    self.logger.warn(format_args!("Socket accept failed: {}", e));
                    continue;
                }
            };

            let connection = Connection::new(stream, peer, self.io_timeout);
            let ip = connection.peer_ip();
            let id = self.registry.add_client(connection, &ip);

            let channel = Arc::clone(&self);
            let running = Arc::clone(&running);
            tracker.spawn(async move {
                channel.serve_client(id, ip, running).await;
            });
        }

        self.registry.close_all();
        self.logger.debug(format_args!("Socket channel stopped"));
    }

    async fn serve_client(&self, id: ClientId, ip: String, running: Arc<AtomicBool>) {
        if !is_local_peer(&ip, &self.own_ip) {
            if self.devices.touch(&ip) {
                let note = if self.auth_enabled {
                    " (authentication required)"
                } else {
                    ""
                };
                self.logger.info(format_args!("[CONNECTED] {}{}", ip, note));
            }
            let banner = welcome_message(self.auth_enabled);
            if let Err(e) = self.registry.send_to_client(id, banner.as_bytes()).await {
                self.logger
                    .debug(format_args!("Failed to greet client {} ({}): {}", id, ip, e));
                self.registry.remove_client(id);
                return;
            }
        }

        if let Err(e) = self.session(id, &running).await {
            self.logger
                .debug(format_args!("Socket session {} ({}) ended: {}", id, ip, e));
        }
        self.registry.remove_client(id);
    }

    async fn session(&self, id: ClientId, running: &AtomicBool) -> io::Result<()> {
        let mut pending = Vec::new();
        let mut buf = [0u8; 1024];

        while running.load(Ordering::SeqCst) {
            let read = tokio::time::timeout(
                self.poll,
                self.registry.receive_from_client(id, &mut buf),
            )
            .await;
            let n = match read {
                Err(_) => continue,
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => continue,
                Ok(result) => result?,
            };
            if n == 0 {
                return Ok(());
            }
            pending.extend_from_slice(&buf[..n]);

            while let Some(line) = session::take_line(&mut pending) {
                if line.is_empty() {
                    continue;
                }
                let reply = handle_command(
                    &self.registry,
                    &self.credentials,
                    self.auth_enabled,
                    id,
                    &line,
                );
                self.registry.send_to_client(id, &reply.to_wire()).await?;
                if reply.close {
                    return Ok(());
                }
            }

            if pending.len() > MAX_LINE {
                pending.clear();
                self.registry
                    .send_to_client(id, b"ERROR line too long\n")
                    .await?;
            }
        }
        Ok(())
    }
}
