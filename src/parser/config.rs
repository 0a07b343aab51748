use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ContentType;

/// CSS selectors and extraction rules for every portal page we parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Query parameters that carry an item id in detail links, in priority order
    pub item_id_params: Vec<String>,

    /// Links to attachments on any detail page
    pub attachment_selector: String,

    pub menu: MenuSelectors,
    pub courses: CourseSelectors,
    pub notice: BoardSelectors,
    pub material: BoardSelectors,
    pub assignment: BoardSelectors,
    pub syllabus: SyllabusSelectors,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            item_id_params: vec![
                "id".to_string(),
                "article_id".to_string(),
                "seq".to_string(),
                "no".to_string(),
            ],
            attachment_selector: ".attachments a, a.attachment".to_string(),
            menu: MenuSelectors::default(),
            courses: CourseSelectors::default(),
            notice: BoardSelectors::default(),
            material: BoardSelectors::default(),
            assignment: BoardSelectors::assignment(),
            syllabus: SyllabusSelectors::default(),
        }
    }
}

/// Course room navigation menu
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuSelectors {
    pub link: String,
    pub notice_keywords: Vec<String>,
    pub material_keywords: Vec<String>,
    pub assignment_keywords: Vec<String>,
    pub syllabus_keywords: Vec<String>,
}

impl Default for MenuSelectors {
    fn default() -> Self {
        Self {
            link: "#course-menu a, .course-menu a".to_string(),
            notice_keywords: vec!["notice".into(), "announcement".into(), "공지".into()],
            material_keywords: vec!["material".into(), "resource".into(), "자료".into()],
            assignment_keywords: vec!["assignment".into(), "homework".into(), "과제".into()],
            syllabus_keywords: vec!["syllabus".into(), "강의계획".into()],
        }
    }
}

impl MenuSelectors {
    pub fn keywords(&self, content_type: ContentType) -> &[String] {
        match content_type {
            ContentType::Notice => &self.notice_keywords,
            ContentType::Material => &self.material_keywords,
            ContentType::Assignment => &self.assignment_keywords,
            ContentType::Syllabus => &self.syllabus_keywords,
        }
    }
}

/// The user's course list on the portal home page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseSelectors {
    pub link: String,
    /// Attribute holding the course id; falls back to `id_params` on the href
    pub id_attribute: String,
    pub id_params: Vec<String>,
}

impl Default for CourseSelectors {
    fn default() -> Self {
        Self {
            link: ".course-list a.course-link".to_string(),
            id_attribute: "data-course-id".to_string(),
            id_params: vec!["course_id".to_string(), "course".to_string()],
        }
    }
}

/// A paged board (notices, materials, assignments): list table plus detail view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSelectors {
    pub row: String,
    pub link: String,
    pub author: String,
    pub date: String,
    /// Rows matching this are placeholders such as "no posts"
    pub empty_row: String,
    /// Class marking rows pinned to the top of the board
    pub pinned_class: String,
    /// For `javascript:` links: detail URL with `{id}` substituted
    pub detail_url_template: Option<String>,
    /// Extra list columns, name to selector within the row
    pub list_extra: BTreeMap<String, String>,

    pub detail_title: String,
    pub detail_author: String,
    pub detail_date: String,
    pub detail_body: String,
    /// Extra detail fields, name to selector
    pub detail_extra: BTreeMap<String, String>,
}

impl Default for BoardSelectors {
    fn default() -> Self {
        Self {
            row: "table.board-list tbody tr".to_string(),
            link: "td.title a".to_string(),
            author: "td.author".to_string(),
            date: "td.date".to_string(),
            empty_row: "td.empty".to_string(),
            pinned_class: "pinned".to_string(),
            detail_url_template: None,
            list_extra: BTreeMap::new(),
            detail_title: ".board-view .title".to_string(),
            detail_author: ".board-view .author".to_string(),
            detail_date: ".board-view .date".to_string(),
            detail_body: ".board-view .content".to_string(),
            detail_extra: BTreeMap::new(),
        }
    }
}

impl BoardSelectors {
    pub fn assignment() -> Self {
        let mut selectors = Self::default();
        selectors
            .list_extra
            .insert("due_at".to_string(), "td.due".to_string());
        selectors
            .detail_extra
            .insert("due_at".to_string(), ".board-view .due".to_string());
        selectors.detail_extra.insert(
            "submission_status".to_string(),
            ".board-view .submission".to_string(),
        );
        selectors
    }
}

/// Single-page course syllabus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyllabusSelectors {
    pub body: String,
    pub title: String,
    pub fields: BTreeMap<String, String>,
}

impl Default for SyllabusSelectors {
    fn default() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("instructor".to_string(), ".syllabus .instructor".to_string());
        fields.insert("schedule".to_string(), ".syllabus .schedule".to_string());
        Self {
            body: ".syllabus".to_string(),
            title: ".syllabus h2".to_string(),
            fields,
        }
    }
}
