pub mod attachment;
pub mod content;
pub mod course;
pub mod task;

pub use attachment::{AttachmentKey, AttachmentRecord};
pub use content::{AttachmentRef, ContentItem, ContentKey, ContentType, Detail, SyncStatus, Summary};
pub use course::{Course, CourseMenu};
pub use task::{SyncCounters, SyncMode, SyncScope, SyncTarget, SyncTask, TaskState};
