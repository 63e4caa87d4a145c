//! 文件传输模块
//!
//! 包含:
//! - 传输编排 ([`TransferServer`])
//! - Web 客户端 JSON 消息格式
//! - 设备活动表、待下载队列、上传落盘、进度去重

pub mod devices;
pub mod progress;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod upload;

pub use devices::DeviceActivity;
pub use progress::{AnnounceCallback, PercentTracker, ProgressCallback};
pub use protocol::{
    AnnounceRequest, AuthConfig, DevicesResponse, PendingFile, PendingFilesResponse,
    StatusResponse,
};
pub use queue::{PendingEntry, PendingQueue};
pub use server::TransferServer;
