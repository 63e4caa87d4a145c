//! 错误类型

use std::path::PathBuf;

/// 传输服务器错误
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("server is not running")]
    NotRunning,

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no download directory configured")]
    NoDownloadDirectory,

    #[error("no connected devices")]
    NoConnectedDevices,

    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;
