//! BLADE Core Library
//!
//! 局域网文件互传服务的核心实现：手机浏览器打开主机上的 Web 页面即可上传、
//! 下载文件，无需安装任何客户端。
//!
//! # 模块
//!
//! - **net**: TCP 监听 / 连接原语、局域网地址探测
//! - **auth**: 凭据与会话令牌
//! - **legacy**: 与 HTTP 并存的原始 socket 通道
//! - **http**: 手写的 HTTP/1.1 协议引擎
//! - **transfer**: 传输编排、待下载队列、上传落盘
//! - **config**: 服务器设置与持久化
//! - **logging**: 注入式日志句柄
//!
//! # 使用示例
//!
//! ```ignore
//! use blade_core::{ServerSettings, TransferServer};
//!
//! let server = TransferServer::new(ServerSettings::load());
//! server.set_download_directory("./received")?;
//! server.on_incoming_progress(|name, pct| println!("{name}: {pct}%"));
//! server.start()?;
//!
//! println!("Open {} on your phone", server.pairing_url().unwrap_or_default());
//!
//! // 手机打开页面后即可排队发送
//! server.enqueue_downloads(["./photo.jpg"])?;
//!
//! server.stop().await;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod legacy;
pub mod logging;
pub mod net;
pub mod sync;
pub mod transfer;

pub use auth::CredentialStore;
pub use config::{AuthSettings, Limits, ServerSettings, Timeouts, UserEntry};
pub use error::{Result, ServerError};
pub use legacy::{ClientInfo, ConnectionRegistry};
pub use logging::{LogEntry, LogLevel, LogSink, Logger, MemorySink};
pub use transfer::TransferServer;
