use serde::{Deserialize, Serialize};

use crate::portal::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMethod {
    #[default]
    Get,
    Post,
}

impl From<EntryMethod> for Method {
    fn from(m: EntryMethod) -> Self {
        match m {
            EntryMethod::Get => Method::Get,
            EntryMethod::Post => Method::Post,
        }
    }
}

/// Where the course list lives and how a course room is entered.
///
/// `{course}` in a path is replaced with the course id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub courses_path: String,

    pub room_entry_path: String,

    pub room_entry_method: EntryMethod,

    /// Form or query field carrying the course id on room entry
    pub room_entry_param: Option<String>,

    /// Landing page fetched after entry; when unset the entry response is the landing page
    pub room_home_path: Option<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            courses_path: "/mypage".to_string(),
            room_entry_path: "/course/enter".to_string(),
            room_entry_method: EntryMethod::Post,
            room_entry_param: Some("course_id".to_string()),
            room_home_path: Some("/course/{course}/home".to_string()),
        }
    }
}

impl NavigationConfig {
    pub fn room_entry_url(&self, course_id: &str) -> String {
        self.room_entry_path.replace("{course}", course_id)
    }

    pub fn room_home_url(&self, course_id: &str) -> Option<String> {
        self.room_home_path
            .as_ref()
            .map(|p| p.replace("{course}", course_id))
    }
}
