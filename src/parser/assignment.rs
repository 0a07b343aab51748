use crate::app::Result;
use crate::domain::{ContentType, Detail};
use crate::parser::config::{BoardSelectors, ParserConfig};
use crate::parser::{board, ContentParser, ListRow};

/// Assignment board. Adds `due_at` (and `submission_status` on detail pages).
pub struct AssignmentParser {
    selectors: BoardSelectors,
    id_params: Vec<String>,
    attachment_selector: String,
}

impl AssignmentParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            selectors: config.assignment.clone(),
            id_params: config.item_id_params.clone(),
            attachment_selector: config.attachment_selector.clone(),
        }
    }
}

/// Portals print the submission window as "start ~ end"; only the end matters.
fn normalize_due(raw: &str) -> String {
    raw.rsplit('~').next().unwrap_or(raw).trim().to_string()
}

impl ContentParser for AssignmentParser {
    fn content_type(&self) -> ContentType {
        ContentType::Assignment
    }

    fn parse_list(&self, html: &str) -> Result<Vec<ListRow>> {
        let mut rows = board::parse_list(html, &self.selectors, &self.id_params)?;
        for summary in rows.iter_mut().flatten() {
            if let Some(due) = summary.extra.get_mut("due_at") {
                *due = normalize_due(due);
            }
        }
        Ok(rows)
    }

    fn parse_detail(&self, html: &str) -> Result<Detail> {
        let mut detail =
            board::parse_detail(html, &self.selectors, &self.attachment_selector, false)?;
        if let Some(due) = detail.extra.get_mut("due_at") {
            *due = normalize_due(due);
        }
        Ok(detail)
    }
}
