//! 服务器配置和持久化
//!
//! 端口、Web 根目录、认证方式、超时和大小上限的存储与读取。

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// 认证方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AuthSettings {
    #[default]
    Disabled,
    /// 单一共享密码
    Password { password: String },
    /// 用户名/密码表
    Users { users: Vec<UserEntry> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub password: String,
}

impl AuthSettings {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, AuthSettings::Disabled)
    }
}

/// 大小上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// 请求头（含提前读入的部分正文）上限
    pub max_header_bytes: usize,
    /// 静态文件上限
    pub max_static_file_bytes: u64,
    /// 上传正文上限
    pub max_upload_bytes: u64,
    /// announce 请求正文上限
    pub max_announce_bytes: usize,
    /// listen backlog
    pub backlog: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 1024 * 1024,
            max_static_file_bytes: 10 * MIB,
            max_upload_bytes: 4 * 1024 * MIB,
            max_announce_bytes: 64 * 1024,
            backlog: 10,
        }
    }
}

/// 超时设置（秒 / 毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// 普通请求的读写超时
    pub request_secs: u64,
    /// 下载路由的读写超时
    pub download_secs: u64,
    /// accept 轮询间隔
    pub accept_poll_ms: u64,
    /// 设备清理轮询间隔
    pub sweep_interval_ms: u64,
    /// 设备无活动判定阈值
    pub device_inactivity_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: 5,
            download_secs: 600,
            accept_poll_ms: 1000,
            sweep_interval_ms: 1000,
            device_inactivity_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn device_inactivity(&self) -> Duration {
        Duration::from_secs(self.device_inactivity_secs)
    }
}

/// 服务器设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Web 界面端口
    pub http_port: u16,
    /// 原始 socket 通道端口
    pub transfer_port: u16,
    /// 静态文件根目录
    pub web_root: PathBuf,
    /// 上传文件保存目录
    pub download_dir: Option<PathBuf>,
    /// 详细日志模式
    pub verbose: bool,
    /// 认证方式
    pub auth: AuthSettings,
    pub limits: Limits,
    pub timeouts: Timeouts,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 80,
            transfer_port: 8080,
            web_root: PathBuf::from("./web"),
            download_dir: None,
            verbose: false,
            auth: AuthSettings::Disabled,
            limits: Limits::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl ServerSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blade");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ServerSettings::default();
        assert_eq!(settings.http_port, 80);
        assert_eq!(settings.transfer_port, 8080);
        assert!(!settings.auth.is_enabled());
        assert_eq!(settings.limits.max_header_bytes, 1024 * 1024);
        assert_eq!(settings.timeouts.device_inactivity(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: ServerSettings = toml::from_str(
            r#"
            http_port = 8000

            [auth]
            mode = "password"
            password = "hunter2"

            [timeouts]
            request_secs = 9
            "#,
        )
        .unwrap();

        assert_eq!(settings.http_port, 8000);
        assert_eq!(settings.transfer_port, 8080);
        assert_eq!(
            settings.auth,
            AuthSettings::Password {
                password: "hunter2".to_string()
            }
        );
        assert_eq!(settings.timeouts.request_secs, 9);
        assert_eq!(settings.timeouts.download_secs, 600);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let settings = ServerSettings {
            auth: AuthSettings::Users {
                users: vec![UserEntry {
                    username: "alice".to_string(),
                    password: "secret".to_string(),
                }],
            },
            download_dir: Some(PathBuf::from("/tmp/blade")),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        assert_eq!(ServerSettings::load_from(&path), settings);
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "http_port = \"not a number\"").unwrap();

        assert_eq!(ServerSettings::load_from(&path), ServerSettings::default());
    }
}
