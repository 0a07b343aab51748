//! Shared extraction helpers for portal pages.

use std::collections::BTreeMap;

use scraper::{ElementRef, Node, Selector};
use url::Url;

use crate::app::{Result, SatchelError};
use crate::domain::AttachmentRef;

pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| SatchelError::Parse(format!("invalid selector {:?}: {:?}", css, e)))
}

/// Collapse runs of whitespace into single spaces
pub fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Elements whose start separates the text around them.
const BREAKING: &[&str] = &[
    "br", "p", "div", "li", "tr", "td", "th", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Visible text of an element. Inline markup joins its neighbours as is,
/// block and cell boundaries become a space.
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if BREAKING.contains(&e.name()) => text.push(' '),
            _ => {}
        }
    }
    collapse(&text)
}

pub fn first_element<'a>(scope: ElementRef<'a>, css: &str) -> Result<Option<ElementRef<'a>>> {
    let sel = selector(css)?;
    Ok(scope.select(&sel).next())
}

/// Text of the first match, `None` when absent or blank.
pub fn first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>> {
    Ok(first_element(scope, css)?
        .map(element_text)
        .filter(|t| !t.is_empty()))
}

pub fn select_fields(
    scope: ElementRef<'_>,
    fields: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (name, css) in fields {
        if let Some(value) = first_text(scope, css)? {
            out.insert(name.clone(), value);
        }
    }
    Ok(out)
}

/// Extract the remote item id from a detail link.
///
/// Looks at the configured query parameters first, then falls back to the
/// last run of ASCII digits anywhere in the link, which also covers
/// `javascript:view('77')` style links.
pub fn extract_item_id(href: &str, params: &[String]) -> Option<String> {
    let parsed = Url::parse(href).or_else(|_| {
        Url::parse("http://placeholder.invalid/").and_then(|base| base.join(href))
    });

    if let Ok(url) = parsed {
        for param in params {
            let found = url
                .query_pairs()
                .find(|(k, v)| k == param.as_str() && !v.is_empty())
                .map(|(_, v)| v.into_owned());
            if found.is_some() {
                return found;
            }
        }
    }

    last_digit_run(href).map(String::from)
}

fn last_digit_run(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let end = bytes.iter().rposition(|b| b.is_ascii_digit())?;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    Some(&s[start..=end])
}

/// Resolve `href` against the page it was found on.
pub fn resolve_link(base: &str, href: &str) -> String {
    if href.is_empty() {
        return base.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Attachment links inside `scope`, first occurrence of each file name wins.
pub fn extract_attachments(scope: ElementRef<'_>, css: &str) -> Result<Vec<AttachmentRef>> {
    let sel = selector(css)?;
    let mut refs: Vec<AttachmentRef> = Vec::new();

    for link in scope.select(&sel) {
        let Some(href) = link.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href == "#" {
            continue;
        }

        let name = Some(element_text(link))
            .filter(|t| !t.is_empty())
            .or_else(|| link.value().attr("download").map(String::from))
            .or_else(|| file_name_from_href(href))
            .unwrap_or_else(|| "attachment".to_string());

        if refs.iter().any(|r| r.name == name) {
            continue;
        }
        refs.push(AttachmentRef {
            name,
            url: href.to_string(),
        });
    }

    Ok(refs)
}

fn file_name_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?;
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(String::from)
}
