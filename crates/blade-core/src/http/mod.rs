//! 手写的 HTTP/1.1 协议引擎
//!
//! - **request**: 头部读取与解析
//! - **response**: 响应构造
//! - **multipart**: 上传正文切分
//! - **routes**: 路由表
//! - **static_files**: Web 根目录静态文件
//! - **server**: accept 循环与请求分发

pub mod multipart;
pub mod request;
pub mod response;
pub mod routes;
pub mod server;
pub mod static_files;

pub use request::Request;
pub use response::Response;
pub use routes::{Route, RouteTable};
pub use server::{HttpEngine, TransferHandler};
