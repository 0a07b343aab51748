//! List/detail extraction shared by the board-style content types.

use scraper::{ElementRef, Html, Selector};

use crate::app::{Result, SatchelError};
use crate::domain::{Detail, Summary};
use crate::parser::config::BoardSelectors;
use crate::parser::html::{
    element_text, extract_attachments, extract_item_id, first_element, first_text, select_fields,
    selector,
};
use crate::parser::ListRow;

pub(crate) fn parse_list(
    html: &str,
    selectors: &BoardSelectors,
    id_params: &[String],
) -> Result<Vec<ListRow>> {
    let doc = Html::parse_document(html);
    let row_sel = selector(&selectors.row)?;
    let link_sel = selector(&selectors.link)?;
    let empty_sel = selector(&selectors.empty_row)?;

    let rows = doc
        .select(&row_sel)
        .filter(|row| row.select(&empty_sel).next().is_none())
        .enumerate()
        .map(|(index, row)| parse_row(row, index, &link_sel, selectors, id_params))
        .collect::<Result<Vec<_>>>()?;

    Ok(rows)
}

fn parse_row(
    row: ElementRef<'_>,
    index: usize,
    link_sel: &Selector,
    selectors: &BoardSelectors,
    id_params: &[String],
) -> Result<ListRow> {
    let Some(link) = row.select(link_sel).next() else {
        return Ok(Err(SatchelError::Parse(format!(
            "row {} has no detail link",
            index
        ))));
    };

    let href = link
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|h| !h.is_empty() && *h != "#");
    let (raw, scripted) = match href {
        Some(h) => (h, h.starts_with("javascript:")),
        None => match link.value().attr("onclick") {
            Some(js) => (js, true),
            None => {
                return Ok(Err(SatchelError::Parse(format!(
                    "row {} link has no target",
                    index
                ))));
            }
        },
    };

    let Some(remote_id) = extract_item_id(raw, id_params) else {
        return Ok(Err(SatchelError::Parse(format!(
            "row {}: no item id in {:?}",
            index, raw
        ))));
    };

    let detail_url = match &selectors.detail_url_template {
        Some(template) => template.replace("{id}", &remote_id),
        None if scripted => {
            return Ok(Err(SatchelError::Parse(format!(
                "row {}: scripted link {:?} and no detail_url_template",
                index, raw
            ))));
        }
        None => raw.to_string(),
    };

    let mut summary = Summary::new(remote_id, element_text(link), detail_url);
    summary.author = first_text(row, &selectors.author)?;
    summary.posted_at = first_text(row, &selectors.date)?;
    summary.extra = select_fields(row, &selectors.list_extra)?;
    if row
        .value()
        .classes()
        .any(|c| c == selectors.pinned_class)
    {
        summary.extra.insert("pinned".to_string(), "true".to_string());
    }

    Ok(Ok(summary))
}

/// Parse a board detail page. A missing body container is a parse error
/// unless `allow_bodyless` is set and the page carries attachments.
pub(crate) fn parse_detail(
    html: &str,
    selectors: &BoardSelectors,
    attachment_selector: &str,
    allow_bodyless: bool,
) -> Result<Detail> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let attachments = extract_attachments(root, attachment_selector)?;
    let (body_html, body_text) = match first_element(root, &selectors.detail_body)? {
        Some(body) => (body.inner_html().trim().to_string(), element_text(body)),
        None if allow_bodyless && !attachments.is_empty() => (String::new(), String::new()),
        None => {
            return Err(SatchelError::Parse(format!(
                "detail body {:?} not found",
                selectors.detail_body
            )))
        }
    };

    Ok(Detail {
        title: first_text(root, &selectors.detail_title)?,
        author: first_text(root, &selectors.detail_author)?,
        posted_at: first_text(root, &selectors.detail_date)?,
        body_html,
        body_text,
        attachments,
        extra: select_fields(root, &selectors.detail_extra)?,
    })
}
