//! Web 客户端 JSON 消息格式
//!
//! 字段名与浏览器端脚本保持一致：`authEnabled`、`devices`、`files`、`status` 等。

use serde::{Deserialize, Serialize};

use crate::config::AuthSettings;

/// `{"status":"ok"}` / `{"status":"error"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: "error".to_string(),
        }
    }
}

/// `/api/auth-config` 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub auth_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub password: Option<String>,
}

impl AuthConfig {
    /// 用户表模式下只暴露第一个用户
    pub fn from_settings(settings: &AuthSettings) -> Self {
        match settings {
            AuthSettings::Disabled => Self {
                auth_enabled: false,
                username: None,
                password: None,
            },
            AuthSettings::Password { password } => Self {
                auth_enabled: true,
                username: None,
                password: Some(password.clone()),
            },
            AuthSettings::Users { users } => Self {
                auth_enabled: true,
                username: users.first().map(|u| u.username.clone()),
                password: users.first().map(|u| u.password.clone()),
            },
        }
    }
}

/// `/api/connected-devices` 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFile {
    pub index: usize,
    pub name: String,
    pub size: u64,
}

/// `/api/pending-files` 响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFilesResponse {
    pub files: Vec<PendingFile>,
}

/// `/api/upload/announce` 请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceRequest {
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

impl AnnounceRequest {
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|req| !req.filename.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserEntry;

    #[test]
    fn test_auth_config_shapes() {
        let disabled = AuthConfig::from_settings(&AuthSettings::Disabled);
        assert_eq!(
            serde_json::to_string(&disabled).unwrap(),
            r#"{"authEnabled":false}"#
        );

        let password = AuthConfig::from_settings(&AuthSettings::Password {
            password: "pw".to_string(),
        });
        assert_eq!(
            serde_json::to_string(&password).unwrap(),
            r#"{"authEnabled":true,"password":"pw"}"#
        );

        let users = AuthConfig::from_settings(&AuthSettings::Users {
            users: vec![
                UserEntry {
                    username: "alice".to_string(),
                    password: "a".to_string(),
                },
                UserEntry {
                    username: "bob".to_string(),
                    password: "b".to_string(),
                },
            ],
        });
        assert_eq!(
            serde_json::to_string(&users).unwrap(),
            r#"{"authEnabled":true,"username":"alice","password":"a"}"#
        );
    }

    #[test]
    fn test_listing_shapes() {
        let files = PendingFilesResponse {
            files: vec![PendingFile {
                index: 0,
                name: "a.txt".to_string(),
                size: 123,
            }],
        };
        assert_eq!(
            serde_json::to_string(&files).unwrap(),
            r#"{"files":[{"index":0,"name":"a.txt","size":123}]}"#
        );
        assert_eq!(
            serde_json::to_string(&StatusResponse::ok()).unwrap(),
            r#"{"status":"ok"}"#
        );
    }

    #[test]
    fn test_parse_announce() {
        let req = AnnounceRequest::parse(br#"{"filename":"photo.jpg","size":2048}"#).unwrap();
        assert_eq!(req.filename, "photo.jpg");
        assert_eq!(req.size, 2048);

        assert!(AnnounceRequest::parse(b"not json").is_none());
        assert!(AnnounceRequest::parse(br#"{"filename":"","size":1}"#).is_none());
        assert!(AnnounceRequest::parse(br#"{"size":1}"#).is_none());
    }
}
