//! Portal credentials lookup.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::app::{Result, SatchelError};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves a user id to portal credentials. Decryption, if any, happens
/// behind this trait.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Credentials>;
}

/// Fixed user id to credentials table.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    entries: HashMap<String, Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user_id: &str, credentials: Credentials) -> Self {
        self.insert(user_id, credentials);
        self
    }

    pub fn insert(&mut self, user_id: &str, credentials: Credentials) {
        self.entries.insert(user_id.to_string(), credentials);
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn get(&self, user_id: &str) -> Result<Credentials> {
        self.entries
            .get(user_id)
            .cloned()
            .ok_or_else(|| SatchelError::auth(user_id, "no credentials registered"))
    }
}
