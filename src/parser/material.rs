use crate::app::Result;
use crate::domain::{ContentType, Detail};
use crate::parser::config::{BoardSelectors, ParserConfig};
use crate::parser::{board, ContentParser, ListRow};

/// Lecture materials board. Posts are often nothing but files, so a detail
/// page without a body container is accepted when it carries attachments.
pub struct MaterialParser {
    selectors: BoardSelectors,
    id_params: Vec<String>,
    attachment_selector: String,
}

impl MaterialParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            selectors: config.material.clone(),
            id_params: config.item_id_params.clone(),
            attachment_selector: config.attachment_selector.clone(),
        }
    }
}

impl ContentParser for MaterialParser {
    fn content_type(&self) -> ContentType {
        ContentType::Material
    }

    fn parse_list(&self, html: &str) -> Result<Vec<ListRow>> {
        board::parse_list(html, &self.selectors, &self.id_params)
    }

    fn parse_detail(&self, html: &str) -> Result<Detail> {
        board::parse_detail(html, &self.selectors, &self.attachment_selector, true)
    }
}
