//! Page parsers: pure functions from portal HTML to structured summaries,
//! details, menus and course lists. One [`ContentParser`] per content type.

mod assignment;
mod board;
pub mod config;
mod courses;
pub mod html;
mod material;
mod menu;
mod notice;
mod syllabus;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use assignment::AssignmentParser;
pub use config::ParserConfig;
pub use courses::PortalCourseParser;
pub use material::MaterialParser;
pub use menu::PortalMenuParser;
pub use notice::NoticeParser;
pub use syllabus::{SyllabusParser, SYLLABUS_ID};

use crate::app::Result;
use crate::domain::{ContentType, Course, Detail, Summary};

/// One list row. Rows fail individually so a bad row never hides the rest.
pub type ListRow = Result<Summary>;

pub trait ContentParser: Send + Sync {
    fn content_type(&self) -> ContentType;

    /// Rows in portal order. `Err` only when the page cannot be examined at
    /// all; a page without any rows is an empty list.
    fn parse_list(&self, html: &str) -> Result<Vec<ListRow>>;

    fn parse_detail(&self, html: &str) -> Result<Detail>;
}

pub trait MenuParser: Send + Sync {
    fn parse_menus(&self, html: &str) -> Result<BTreeMap<ContentType, String>>;
}

pub trait CourseListParser: Send + Sync {
    fn parse_courses(&self, html: &str) -> Result<Vec<Course>>;
}

/// The parser capability handed to navigation and synchronization.
#[derive(Clone)]
pub struct ParserSet {
    menus: Arc<dyn MenuParser>,
    courses: Arc<dyn CourseListParser>,
    content: BTreeMap<ContentType, Arc<dyn ContentParser>>,
}

impl ParserSet {
    pub fn from_config(config: &ParserConfig) -> Self {
        let parsers: [Arc<dyn ContentParser>; 4] = [
            Arc::new(NoticeParser::new(config)),
            Arc::new(MaterialParser::new(config)),
            Arc::new(AssignmentParser::new(config)),
            Arc::new(SyllabusParser::new(config)),
        ];

        Self {
            menus: Arc::new(PortalMenuParser::new(config.menu.clone())),
            courses: Arc::new(PortalCourseParser::new(config.courses.clone())),
            content: parsers
                .into_iter()
                .map(|p| (p.content_type(), p))
                .collect(),
        }
    }

    /// Replace the parser registered for the parser's content type.
    pub fn with_content_parser(mut self, parser: Arc<dyn ContentParser>) -> Self {
        self.content.insert(parser.content_type(), parser);
        self
    }

    pub fn menus(&self) -> &dyn MenuParser {
        self.menus.as_ref()
    }

    pub fn courses(&self) -> &dyn CourseListParser {
        self.courses.as_ref()
    }

    pub fn for_type(&self, content_type: ContentType) -> Option<&dyn ContentParser> {
        self.content.get(&content_type).map(|p| p.as_ref())
    }
}

impl Default for ParserSet {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}
