//! 原始 socket 通道的行协议
//!
//! 每行一条命令，以 `\n` 结尾：
//!
//! | 命令 | 响应 |
//! |---|---|
//! | `AUTH <secret>` / `AUTH <user> <password>` | `OK <token>` / `ERROR invalid credentials` |
//! | `VALIDATE <token>` | `OK` / `ERROR invalid token` |
//! | `LOGOUT` | `OK` |
//! | `PING` | `PONG` |
//! | `QUIT` | `BYE`，随后关闭连接 |

use crate::auth::CredentialStore;
use crate::legacy::registry::{ClientId, ConnectionRegistry};

/// 单条命令的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub close: bool,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            close: false,
        }
    }

    fn closing(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            close: true,
        }
    }

    /// 发送到客户端的字节
    pub fn to_wire(&self) -> Vec<u8> {
        format!("{}\n", self.text).into_bytes()
    }
}

/// 欢迎信息
pub fn welcome_message(auth_enabled: bool) -> String {
    let mut msg = String::from("Welcome to BLADE Server!\n");
    if auth_enabled {
        msg.push_str("Please authenticate to continue.\n");
    } else {
        msg.push_str("Authentication is disabled.\n");
    }
    msg
}

/// 处理一行命令
pub fn handle_command(
    registry: &ConnectionRegistry,
    credentials: &CredentialStore,
    auth_enabled: bool,
    id: ClientId,
    line: &str,
) -> Reply {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default().to_ascii_uppercase();
    let args: Vec<&str> = parts.collect();

    match command.as_str() {
        "AUTH" => {
            if !auth_enabled {
                return Reply::line("ERROR authentication disabled");
            }
            let token = match args.as_slice() {
                [secret] => credentials.authenticate(secret),
                [username, password] => credentials.authenticate_user(username, password),
                _ => return Reply::line("ERROR usage: AUTH <secret> | AUTH <user> <password>"),
            };
            match token {
                Some(token) => {
                    registry.authenticate_client(id, &token);
                    Reply::line(format!("OK {token}"))
                }
                None => Reply::line("ERROR invalid credentials"),
            }
        }
        "VALIDATE" => match args.as_slice() {
            [token] if credentials.validate_token(token) => Reply::line("OK"),
            [_] => Reply::line("ERROR invalid token"),
            _ => Reply::line("ERROR usage: VALIDATE <token>"),
        },
        "LOGOUT" => {
            if let Some(token) = registry.deauthenticate_client(id) {
                credentials.invalidate_token(&token);
            }
            Reply::line("OK")
        }
        "PING" => Reply::line("PONG"),
        "QUIT" => Reply::closing("BYE"),
        _ => Reply::line("ERROR unknown command"),
    }
}

/// 从缓冲区中取出一行完整命令（不含换行符）
pub fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let pos = pending.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = pending.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line).trim().to_string())
}
