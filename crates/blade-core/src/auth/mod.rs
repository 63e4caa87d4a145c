//! 凭据与会话令牌
//!
//! 保存一份加盐哈希后的共享密码（或用户名/密码表），以及当前有效的会话令牌集合。
//!
//! # 安全性
//!
//! - 哈希为加盐 SHA-256，不是慢速 KDF，只适用于局域网便利场景
//! - 令牌为 32 位十六进制随机串，没有过期时间，只在登出时移除

use std::collections::{HashMap, HashSet};

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::AuthSettings;
use crate::sync::Guarded;

const SALT: &str = "BLADE_SALT";
const TOKEN_LEN: usize = 32;
const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Default)]
struct CredentialState {
    secret_hash: Option<String>,
    users: HashMap<String, String>,
    tokens: HashSet<String>,
}

/// 凭据存储
///
/// 所有操作由同一把锁串行化。
#[derive(Debug, Default)]
pub struct CredentialStore {
    state: Guarded<CredentialState>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据认证配置构造
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let store = Self::new();
        match settings {
            AuthSettings::Disabled => {}
            AuthSettings::Password { password } => store.set_secret(password),
            AuthSettings::Users { users } => {
                for user in users {
                    store.add_user(&user.username, &user.password);
                }
            }
        }
        store
    }

    /// 设置共享密码，替换旧值
    pub fn set_secret(&self, secret: &str) {
        let hash = hash_secret(secret);
        self.state.lock().secret_hash = Some(hash);
    }

    /// 添加用户，用户已存在时返回 false
    pub fn add_user(&self, username: &str, password: &str) -> bool {
        let mut state = self.state.lock();
        if state.users.contains_key(username) {
            return false;
        }
        state
            .users
            .insert(username.to_string(), hash_secret(password));
        true
    }

    pub fn user_exists(&self, username: &str) -> bool {
        self.state.lock().users.contains_key(username)
    }

    /// 使用共享密码认证，成功时签发新令牌
    pub fn authenticate(&self, secret: &str) -> Option<String> {
        let mut state = self.state.lock();
        let expected = state.secret_hash.as_deref()?;
        if expected != hash_secret(secret) {
            return None;
        }
        Some(issue_token(&mut state))
    }

    /// 使用用户名/密码认证，成功时签发新令牌
    pub fn authenticate_user(&self, username: &str, password: &str) -> Option<String> {
        let mut state = self.state.lock();
        let expected = state.users.get(username)?;
        if *expected != hash_secret(password) {
            return None;
        }
        Some(issue_token(&mut state))
    }

    pub fn validate_token(&self, token: &str) -> bool {
        self.state.lock().tokens.contains(token)
    }

    /// 撤销令牌（登出）
    pub fn invalidate_token(&self, token: &str) {
        self.state.lock().tokens.remove(token);
    }

    pub fn token_count(&self) -> usize {
        self.state.lock().tokens.len()
    }
}

fn issue_token(state: &mut CredentialState) -> String {
    let token = generate_token();
    state.tokens.insert(token.clone());
    token
}

fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(SALT.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserEntry;

    #[test]
    fn test_authenticate_with_secret() {
        let store = CredentialStore::new();
        assert!(store.authenticate("anything").is_none());

        store.set_secret("hunter2");
        assert!(store.authenticate("wrong").is_none());

        let token = store.authenticate("hunter2").unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.bytes().all(|b| HEX_CHARS.contains(&b)));
        assert!(store.validate_token(&token));
    }

    #[test]
    fn test_set_secret_replaces_previous() {
        let store = CredentialStore::new();
        store.set_secret("old");
        store.set_secret("new");
        assert!(store.authenticate("old").is_none());
        assert!(store.authenticate("new").is_some());
    }

    #[test]
    fn test_tokens_are_unique_and_revocable() {
        let store = CredentialStore::new();
        store.set_secret("pw");

        let a = store.authenticate("pw").unwrap();
        let b = store.authenticate("pw").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.token_count(), 2);

        store.invalidate_token(&a);
        assert!(!store.validate_token(&a));
        assert!(store.validate_token(&b));
        assert!(!store.validate_token("not-a-token"));
    }

    #[test]
    fn test_users_table() {
        let store = CredentialStore::from_settings(&AuthSettings::Users {
            users: vec![UserEntry {
                username: "alice".to_string(),
                password: "wonderland".to_string(),
            }],
        });

        assert!(store.user_exists("alice"));
        assert!(!store.add_user("alice", "again"));
        assert!(store.authenticate_user("alice", "nope").is_none());
        assert!(store.authenticate_user("bob", "wonderland").is_none());
        // 用户表模式下没有共享密码
        assert!(store.authenticate("wonderland").is_none());

        let token = store.authenticate_user("alice", "wonderland").unwrap();
        assert!(store.validate_token(&token));
    }

    #[test]
    fn test_hash_is_salted() {
        let plain = format!("{:x}", Sha256::digest(b"pw"));
        assert_ne!(hash_secret("pw"), plain);
        assert_eq!(hash_secret("pw"), hash_secret("pw"));
    }
}
