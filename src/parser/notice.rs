use crate::app::Result;
use crate::domain::{ContentType, Detail};
use crate::parser::config::{BoardSelectors, ParserConfig};
use crate::parser::{board, ContentParser, ListRow};

/// Course announcements board.
pub struct NoticeParser {
    selectors: BoardSelectors,
    id_params: Vec<String>,
    attachment_selector: String,
}

impl NoticeParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            selectors: config.notice.clone(),
            id_params: config.item_id_params.clone(),
            attachment_selector: config.attachment_selector.clone(),
        }
    }
}

impl ContentParser for NoticeParser {
    fn content_type(&self) -> ContentType {
        ContentType::Notice
    }

    fn parse_list(&self, html: &str) -> Result<Vec<ListRow>> {
        board::parse_list(html, &self.selectors, &self.id_params)
    }

    fn parse_detail(&self, html: &str) -> Result<Detail> {
        board::parse_detail(html, &self.selectors, &self.attachment_selector, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SatchelError;

    const LIST: &str = r#"<html><body>
<table class="board-list"><tbody>
  <tr class="pinned">
    <td class="title"><a href="/board/view?id=9">Exam room changed</a></td>
    <td class="author">Prof. Lee</td><td class="date">2024-03-01</td>
  </tr>
  <tr>
    <td class="title"><a href="/board/view?id=12">Welcome</a></td>
    <td class="author">Prof. Lee</td><td class="date">2024-02-28</td>
  </tr>
  <tr><td class="title">orphan row without link</td></tr>
</tbody></table></body></html>"#;

    const DETAIL: &str = r#"<html><body><div class="board-view">
  <h3 class="title">Welcome</h3>
  <span class="author">Prof. Lee</span><span class="date">2024-02-28 09:00</span>
  <div class="content"><p>See you on <b>Monday</b>.</p></div>
  <ul class="attachments"><li><a href="/files/download?fid=5">syllabus.pdf</a></li></ul>
</div></body></html>"#;

    #[test]
    fn test_parse_list_rows() {
        let parser = NoticeParser::new(&ParserConfig::default());
        let rows = parser.parse_list(LIST).unwrap();
        assert_eq!(rows.len(), 3);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.remote_id, "9");
        assert_eq!(first.title, "Exam room changed");
        assert_eq!(first.detail_url, "/board/view?id=9");
        assert_eq!(first.author.as_deref(), Some("Prof. Lee"));
        assert_eq!(first.extra.get("pinned").map(String::as_str), Some("true"));

        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.remote_id, "12");
        assert!(!second.extra.contains_key("pinned"));

        assert!(matches!(rows[2], Err(SatchelError::Parse(_))));
    }

    #[test]
    fn test_empty_board_is_not_an_error() {
        let parser = NoticeParser::new(&ParserConfig::default());
        let html = r#"<table class="board-list"><tbody>
            <tr><td class="empty" colspan="4">No posts</td></tr>
        </tbody></table>"#;
        assert!(parser.parse_list(html).unwrap().is_empty());
        assert!(parser.parse_list("<html></html>").unwrap().is_empty());
    }

    #[test]
    fn test_parse_detail() {
        let parser = NoticeParser::new(&ParserConfig::default());
        let detail = parser.parse_detail(DETAIL).unwrap();
        assert_eq!(detail.title.as_deref(), Some("Welcome"));
        assert_eq!(detail.posted_at.as_deref(), Some("2024-02-28 09:00"));
        assert_eq!(detail.body_text, "See you on Monday.");
        assert!(detail.body_html.contains("<b>Monday</b>"));
        assert_eq!(detail.attachments.len(), 1);
        assert_eq!(detail.attachments[0].name, "syllabus.pdf");
    }

    #[test]
    fn test_detail_without_body_is_parse_error() {
        let parser = NoticeParser::new(&ParserConfig::default());
        let err = parser
            .parse_detail("<html><body><div>Server busy</div></body></html>")
            .unwrap_err();
        assert!(matches!(err, SatchelError::Parse(_)));
    }

    #[test]
    fn test_scripted_links_use_template() {
        let mut config = ParserConfig::default();
        config.notice.detail_url_template = Some("/board/view?id={id}".to_string());
        let parser = NoticeParser::new(&config);
        let html = r#"<table class="board-list"><tbody><tr>
            <td class="title"><a href="javascript:viewArticle('31')">Quiz</a></td>
        </tr></tbody></table>"#;
        let rows = parser.parse_list(html).unwrap();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.remote_id, "31");
        assert_eq!(row.detail_url, "/board/view?id=31");
    }

    #[test]
    fn test_scripted_links_without_template_fail_per_row() {
        let parser = NoticeParser::new(&ParserConfig::default());
        let html = r##"<table class="board-list"><tbody><tr>
            <td class="title"><a href="#" onclick="viewArticle(31)">Quiz</a></td>
        </tr></tbody></table>"##;
        let rows = parser.parse_list(html).unwrap();
        assert!(rows[0].is_err());
    }
}
