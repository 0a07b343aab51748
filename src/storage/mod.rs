pub mod fs;

use async_trait::async_trait;

use crate::app::Result;

pub use fs::FsObjectStorage;

/// Durable byte storage for downloaded attachments.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at (a sanitized form of) `suggested_path` and return
    /// the reference to persist.
    async fn put(&self, bytes: &[u8], suggested_path: &str) -> Result<String>;
}
