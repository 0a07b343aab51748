use std::collections::BTreeMap;

use scraper::Html;

use crate::app::Result;
use crate::domain::ContentType;
use crate::parser::config::MenuSelectors;
use crate::parser::html::{element_text, selector};
use crate::parser::MenuParser;

/// Classifies course room menu links by keyword.
pub struct PortalMenuParser {
    selectors: MenuSelectors,
}

impl PortalMenuParser {
    pub fn new(selectors: MenuSelectors) -> Self {
        Self { selectors }
    }

    fn classify(&self, label: &str) -> Option<ContentType> {
        let label = label.to_lowercase();
        ContentType::ALL.into_iter().find(|ct| {
            self.selectors
                .keywords(*ct)
                .iter()
                .any(|k| !k.is_empty() && label.contains(&k.to_lowercase()))
        })
    }
}

impl MenuParser for PortalMenuParser {
    fn parse_menus(&self, html: &str) -> Result<BTreeMap<ContentType, String>> {
        let doc = Html::parse_document(html);
        let link_sel = selector(&self.selectors.link)?;
        let mut menus = BTreeMap::new();

        for link in doc.select(&link_sel) {
            let Some(href) = link.value().attr("href").map(str::trim) else {
                continue;
            };
            if href.is_empty() || href == "#" {
                continue;
            }
            if let Some(ct) = self.classify(&element_text(link)) {
                menus.entry(ct).or_insert_with(|| href.to_string());
            }
        }

        Ok(menus)
    }
}
