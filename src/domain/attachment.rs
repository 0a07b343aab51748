use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{ContentKey, ContentType};

/// Dedup identity of a stored attachment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachmentKey {
    pub course_id: String,
    pub content_type: ContentType,
    pub remote_id: String,
    pub file_name: String,
}

impl AttachmentKey {
    pub fn new(item: &ContentKey, file_name: &str) -> Self {
        Self {
            course_id: item.course_id.clone(),
            content_type: item.content_type,
            remote_id: item.remote_id.clone(),
            file_name: file_name.to_string(),
        }
    }

    pub fn item_key(&self) -> ContentKey {
        ContentKey::new(&self.course_id, self.content_type, &self.remote_id)
    }
}

impl fmt::Display for AttachmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.course_id, self.content_type, self.remote_id, self.file_name
        )
    }
}

/// Immutable record of a stored attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub key: AttachmentKey,
    pub byte_len: u64,
    pub media_type: String,
    pub storage_ref: String,
    pub origin_url: String,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

impl AttachmentRecord {
    /// Hex SHA-256 of the attachment bytes
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}
