use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::AttachmentRecord;

/// Category of course content exposed through a course room menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Notice,
    Material,
    Assignment,
    Syllabus,
}

impl ContentType {
    /// Processing order inside a single course.
    pub const ALL: [ContentType; 4] = [
        ContentType::Notice,
        ContentType::Material,
        ContentType::Assignment,
        ContentType::Syllabus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Notice => "notice",
            ContentType::Material => "material",
            ContentType::Assignment => "assignment",
            ContentType::Syllabus => "syllabus",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notice" | "notices" => Ok(ContentType::Notice),
            "material" | "materials" => Ok(ContentType::Material),
            "assignment" | "assignments" => Ok(ContentType::Assignment),
            "syllabus" => Ok(ContentType::Syllabus),
            other => Err(format!("Unknown content type: {}", other)),
        }
    }
}

/// Composite identity of a content item. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey {
    pub course_id: String,
    pub content_type: ContentType,
    pub remote_id: String,
}

impl ContentKey {
    pub fn new(course_id: &str, content_type: ContentType, remote_id: &str) -> Self {
        Self {
            course_id: course_id.to_string(),
            content_type,
            remote_id: remote_id.to_string(),
        }
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.course_id, self.content_type, self.remote_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    New,
    Persisted,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::New => "new",
            SyncStatus::Persisted => "persisted",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "persisted" => SyncStatus::Persisted,
            "error" => SyncStatus::Error,
            _ => SyncStatus::New,
        }
    }
}

/// Attachment link as found on a detail page, before download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub name: String,
    pub url: String,
}

/// One row of a content list page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub remote_id: String,
    pub title: String,
    pub author: Option<String>,
    pub posted_at: Option<String>,
    pub detail_url: String,
    /// Type-specific columns, e.g. an assignment's due date.
    pub extra: BTreeMap<String, String>,
}

impl Summary {
    pub fn new(remote_id: impl Into<String>, title: impl Into<String>, detail_url: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            title: title.into(),
            author: None,
            posted_at: None,
            detail_url: detail_url.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// Parsed detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detail {
    pub title: Option<String>,
    pub author: Option<String>,
    pub posted_at: Option<String>,
    pub body_html: String,
    pub body_text: String,
    pub attachments: Vec<AttachmentRef>,
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub key: ContentKey,
    pub title: String,
    pub author: Option<String>,
    pub posted_at: Option<String>,
    pub body_html: String,
    pub body_text: String,
    pub detail_url: String,
    pub extra: BTreeMap<String, String>,
    pub attachments: Vec<AttachmentRecord>,
    pub status: SyncStatus,
    pub synced_at: DateTime<Utc>,
}

impl ContentItem {
    /// Merge a list row with its detail page. Detail fields win when present.
    pub fn from_parts(
        course_id: &str,
        content_type: ContentType,
        summary: Summary,
        detail: Detail,
    ) -> Self {
        let mut extra = summary.extra;
        extra.extend(detail.extra);

        Self {
            key: ContentKey::new(course_id, content_type, &summary.remote_id),
            title: detail
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or(summary.title),
            author: detail.author.or(summary.author),
            posted_at: detail.posted_at.or(summary.posted_at),
            body_html: detail.body_html,
            body_text: detail.body_text,
            detail_url: summary.detail_url,
            extra,
            attachments: Vec::new(),
            status: SyncStatus::New,
            synced_at: Utc::now(),
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}
