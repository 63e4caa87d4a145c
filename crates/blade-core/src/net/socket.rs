//! TCP socket 原语
//!
//! 对 tokio socket 的薄封装：
//! - 监听端：创建 + SO_REUSEADDR + 绑定 + listen，带超时的 accept
//! - 连接端：所有读写都受连接当前超时约束；`send_all` / `recv_all` 要么全部完成，要么失败

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// 单次读取的临时缓冲区大小
const READ_CHUNK: usize = 16 * 1024;

/// 监听 socket
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    port: u16,
}

impl Listener {
    /// 在 `0.0.0.0:port` 上创建监听 socket；`port == 0` 时由系统分配端口
    pub fn bind(port: u16, backlog: u32) -> io::Result<Self> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
        let inner = socket.listen(backlog)?;
        let port = inner.local_addr()?.port();
        Ok(Self { inner, port })
    }

    /// 实际绑定的端口
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 等待一个连接，超时返回 `Ok(None)`
    pub async fn accept_with_timeout(
        &self,
        timeout: Duration,
    ) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        match tokio::time::timeout(timeout, self.inner.accept()).await {
            Ok(Ok(pair)) => Ok(Some(pair)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

/// 已接受的连接
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    timeout: Duration,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, timeout: Duration) -> Self {
        Self {
            stream,
            peer,
            timeout,
        }
    }

    /// 主动连接（主要用于测试和工具）
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = bounded(timeout, TcpStream::connect(addr)).await?;
        Ok(Self::new(stream, addr, timeout))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// 对端 IP 字符串（IPv4 映射地址还原为 IPv4）
    pub fn peer_ip(&self) -> String {
        normalize_ip(self.peer.ip()).to_string()
    }

    /// 调整后续读写的超时
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// 单次写入，可能只写出部分数据
    pub async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        bounded(self.timeout, self.stream.write(data)).await
    }

    /// 单次读取，返回 0 表示对端关闭
    pub async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        bounded(self.timeout, self.stream.read(buf)).await
    }

    /// 读取一次并追加到 `dst`
    pub async fn receive_into(&mut self, dst: &mut Vec<u8>) -> io::Result<usize> {
        let mut tmp = [0u8; READ_CHUNK];
        let n = self.receive(&mut tmp).await?;
        dst.extend_from_slice(&tmp[..n]);
        Ok(n)
    }

    /// 写出全部数据
    pub async fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut sent = 0;
        while sent < data.len() {
            let n = self.send(&data[sent..]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed during send",
                ));
            }
            sent += n;
        }
        Ok(())
    }

    /// 读满 `buf`
    pub async fn recv_all(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut received = 0;
        while received < buf.len() {
            let n = self.receive(&mut buf[received..]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during receive",
                ));
            }
            received += n;
        }
        Ok(())
    }

    /// 关闭写端并释放连接
    pub async fn close(mut self) {
        let _ = bounded(self.timeout, self.stream.shutdown()).await;
    }
}

/// 将 IPv4 映射的 IPv6 地址还原为 IPv4
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}

async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "socket operation timed out"))?
}
