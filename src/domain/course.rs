use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ContentType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
}

impl Course {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Content type to list URL mapping discovered inside a course room.
///
/// Only valid for the session that discovered it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseMenu {
    pub course_id: String,
    pub entries: BTreeMap<ContentType, String>,
}

impl CourseMenu {
    pub fn new(course_id: &str, entries: BTreeMap<ContentType, String>) -> Self {
        Self {
            course_id: course_id.to_string(),
            entries,
        }
    }

    pub fn url_for(&self, content_type: ContentType) -> Option<&str> {
        self.entries.get(&content_type).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
