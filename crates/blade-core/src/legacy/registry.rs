//! 原始 socket 通道的连接登记表
//!
//! 每个连接对应一条 [`ClientRecord`]，以单调递增的 id 索引。移除连接时只关闭
//! socket、保留记录，因此旧 id 永远不会指向另一个客户端。

use std::io;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::net::Connection;
use crate::sync::Guarded;

pub type ClientId = usize;

/// 连接记录
#[derive(Debug)]
struct ClientRecord {
    ip: String,
    token: Option<String>,
    authenticated: bool,
    connection: Option<Arc<Mutex<Connection>>>,
}

/// 仍处于打开状态的客户端快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub ip: String,
    pub token: Option<String>,
    pub authenticated: bool,
}

/// 连接登记表
///
/// 整个记录列表由一把锁保护；socket 读写只在取出句柄后进行，不占用列表锁。
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: Guarded<Vec<ClientRecord>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新连接，返回其 id
    pub fn add_client(&self, connection: Connection, ip: &str) -> ClientId {
        let mut clients = self.clients.lock();
        clients.push(ClientRecord {
            ip: ip.to_string(),
            token: None,
            authenticated: false,
            connection: Some(Arc::new(Mutex::new(connection))),
        });
        clients.len() - 1
    }

    /// 关闭连接，保留记录
    pub fn remove_client(&self, id: ClientId) -> bool {
        self.clients
            .with(|clients| clients.get_mut(id).and_then(|c| c.connection.take()))
            .is_some()
    }

    /// 当前打开的连接数
    pub fn client_count(&self) -> usize {
        self.clients
            .lock()
            .iter()
            .filter(|c| c.connection.is_some())
            .count()
    }

    /// 标记客户端已认证
    pub fn authenticate_client(&self, id: ClientId, token: &str) -> bool {
        self.clients.with(|clients| match clients.get_mut(id) {
            Some(client) => {
                client.token = Some(token.to_string());
                client.authenticated = true;
                true
            }
            None => false,
        })
    }

    /// 清除客户端的认证状态，返回原令牌
    pub fn deauthenticate_client(&self, id: ClientId) -> Option<String> {
        self.clients.with(|clients| {
            let client = clients.get_mut(id)?;
            client.authenticated = false;
            client.token.take()
        })
    }

    pub fn is_authenticated(&self, id: ClientId) -> bool {
        self.clients
            .lock()
            .get(id)
            .is_some_and(|c| c.authenticated && c.connection.is_some())
    }

    /// 向客户端发送数据，返回发送的字节数
    pub async fn send_to_client(&self, id: ClientId, data: &[u8]) -> io::Result<usize> {
        let connection = self.connection(id)?;
        let mut connection = connection.lock().await;
        connection.send_all(data).await?;
        Ok(data.len())
    }

    /// 从客户端读取数据，返回读取的字节数（0 表示对端关闭）
    pub async fn receive_from_client(&self, id: ClientId, buf: &mut [u8]) -> io::Result<usize> {
        let connection = self.connection(id)?;
        let mut connection = connection.lock().await;
        connection.receive(buf).await
    }

    /// 仍处于打开状态的客户端
    pub fn list_clients(&self) -> Vec<ClientInfo> {
        self.clients
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.connection.is_some())
            .map(|(id, c)| ClientInfo {
                id,
                ip: c.ip.clone(),
                token: c.token.clone(),
                authenticated: c.authenticated,
            })
            .collect()
    }

    /// 关闭所有连接
    pub fn close_all(&self) {
        self.clients.with(|clients| {
            for client in clients.iter_mut() {
                client.connection = None;
            }
        });
    }

    fn connection(&self, id: ClientId) -> io::Result<Arc<Mutex<Connection>>> {
        self.clients
            .lock()
            .get(id)
            .and_then(|c| c.connection.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no open client {id}")))
    }
}
