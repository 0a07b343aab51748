use scraper::Html;

use crate::app::{Result, SatchelError};
use crate::domain::{ContentType, Detail, Summary};
use crate::parser::config::{ParserConfig, SyllabusSelectors};
use crate::parser::html::{element_text, extract_attachments, first_element, first_text, select_fields};
use crate::parser::{ContentParser, ListRow};

/// Remote id of the one syllabus a course has.
pub const SYLLABUS_ID: &str = "syllabus";

/// Single-page syllabus. The menu page is both the list and the detail, so
/// the list yields one summary with an empty detail URL.
pub struct SyllabusParser {
    selectors: SyllabusSelectors,
    attachment_selector: String,
}

impl SyllabusParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            selectors: config.syllabus.clone(),
            attachment_selector: config.attachment_selector.clone(),
        }
    }
}

impl ContentParser for SyllabusParser {
    fn content_type(&self) -> ContentType {
        ContentType::Syllabus
    }

    fn parse_list(&self, html: &str) -> Result<Vec<ListRow>> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();
        if first_element(root, &self.selectors.body)?.is_none() {
            return Ok(Vec::new());
        }
        let title = first_text(root, &self.selectors.title)?
            .unwrap_or_else(|| "Syllabus".to_string());
        Ok(vec![Ok(Summary::new(SYLLABUS_ID, title, ""))])
    }

    fn parse_detail(&self, html: &str) -> Result<Detail> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();
        let body = first_element(root, &self.selectors.body)?
            .ok_or_else(|| SatchelError::Parse("syllabus body not found".to_string()))?;

        Ok(Detail {
            title: first_text(root, &self.selectors.title)?,
            author: None,
            posted_at: None,
            body_html: body.inner_html().trim().to_string(),
            body_text: element_text(body),
            attachments: extract_attachments(root, &self.attachment_selector)?,
            extra: select_fields(root, &self.selectors.fields)?,
        })
    }
}
