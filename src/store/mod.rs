pub mod sqlite;

use std::collections::HashSet;

use crate::app::Result;
use crate::domain::{AttachmentKey, AttachmentRecord, ContentItem, ContentKey, ContentType, Course};

pub use sqlite::SqliteStore;

/// Durable store for synchronized content. Writes keyed by composite key are
/// insert-or-ignore, so an item or attachment is stored at most once. The one
/// exception is an item left incomplete by a failed attachment.
pub trait Store: Send + Sync {
    // Course operations
    fn upsert_courses(&self, user_id: &str, courses: &[Course]) -> Result<()>;
    fn courses_for_user(&self, user_id: &str) -> Result<Vec<Course>>;

    // Content item operations
    /// Ids of complete items; items stored with `Error` status are left out
    /// so the next incremental sync fetches them again.
    fn known_item_ids(&self, course_id: &str, content_type: ContentType) -> Result<HashSet<String>>;
    /// Returns false when a complete row with the same key already existed.
    /// A row stored with `Error` status is overwritten.
    fn insert_content_item(&self, item: &ContentItem) -> Result<bool>;
    /// Overwrite a stored item; used by forced refreshes.
    fn replace_content_item(&self, item: &ContentItem) -> Result<()>;
    fn get_content_item(&self, key: &ContentKey) -> Result<Option<ContentItem>>;
    fn items_for_course(
        &self,
        course_id: &str,
        content_type: Option<ContentType>,
    ) -> Result<Vec<ContentItem>>;

    // Attachment operations
    fn find_attachment(&self, key: &AttachmentKey) -> Result<Option<AttachmentRecord>>;
    /// Returns false when a record with the same dedup key already existed.
    fn insert_attachment(&self, record: &AttachmentRecord) -> Result<bool>;
    fn attachments_for_item(&self, key: &ContentKey) -> Result<Vec<AttachmentRecord>>;
}
