//! 网络原语模块
//!
//! - **socket**: 监听、带超时的 accept、定长收发
//! - **lan**: 本机局域网地址探测

pub mod lan;
pub mod socket;

pub use lan::{is_local_peer, local_lan_address, select_lan_address};
pub use socket::{Connection, Listener, normalize_ip};
