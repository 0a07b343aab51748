pub mod client;
pub mod config;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::Result;

pub use client::{HttpPortalFactory, PortalClient};
pub use config::PortalConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A fetched portal response
#[derive(Debug, Clone)]
pub struct Document {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Document {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// An authenticated client context against the portal for one user.
#[async_trait]
pub trait Portal: Send + Sync {
    /// Run the login handshake. `Ok(false)` means the portal refused the
    /// credentials; `Err` is reserved for transport failures.
    async fn login(&self, username: &str, password: &str) -> Result<bool>;

    /// Network liveness probe. Downgrades the client on failure.
    async fn is_authenticated(&self) -> bool;

    /// Issue a paced request. `url` may be relative to the portal base.
    async fn request(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<Document>;

    async fn close(&self);

    fn last_validated(&self) -> Option<DateTime<Utc>>;
}

/// Builds fresh, unauthenticated portal clients for the session registry.
pub trait PortalFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn Portal>>;
}
