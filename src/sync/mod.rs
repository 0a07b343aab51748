pub mod attachment;
pub mod engine;
pub mod keyed;
pub mod task;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::Result;
use crate::domain::{
    AttachmentRef, ContentItem, ContentType, Summary, SyncCounters, SyncMode, SyncStatus,
};
use crate::navigation::NavigationResolver;
use crate::parser::html::resolve_link;
use crate::parser::{ContentParser, ParserSet};
use crate::portal::Document;
use crate::session::Session;
use crate::store::Store;

pub use attachment::{AttachmentBatch, AttachmentPipeline};
pub use engine::SyncEngine;
pub use task::{SyncTaskRegistry, TaskProgress};

/// What became of one unseen item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Stored,
    /// Another writer stored the same key first.
    AlreadyStored,
    /// Stored without some of its attachments; the next run fetches it again.
    Incomplete,
}

/// List, diff against known ids, fetch details for the rest.
///
/// One implementation serves every content type; per-type behaviour lives
/// in the [`ContentParser`] picked from the [`ParserSet`].
pub struct ContentSynchronizer {
    navigation: Arc<NavigationResolver>,
    parsers: Arc<ParserSet>,
    attachments: AttachmentPipeline,
    store: Arc<dyn Store>,
}

impl ContentSynchronizer {
    pub fn new(
        navigation: Arc<NavigationResolver>,
        parsers: Arc<ParserSet>,
        attachments: AttachmentPipeline,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            navigation,
            parsers,
            attachments,
            store,
        }
    }

    /// Incremental sync of one course and content type.
    pub async fn sync(
        &self,
        session: &Session,
        course_id: &str,
        content_type: ContentType,
        known_ids: &HashSet<String>,
    ) -> Result<SyncCounters> {
        self.sync_with_mode(session, course_id, content_type, known_ids, SyncMode::Incremental)
            .await
    }

    /// Returns `Err` when the list page itself cannot be fetched or parsed,
    /// or when the portal drops the session; other per-item failures are
    /// counted in `errors`.
    pub async fn sync_with_mode(
        &self,
        session: &Session,
        course_id: &str,
        content_type: ContentType,
        known_ids: &HashSet<String>,
        mode: SyncMode,
    ) -> Result<SyncCounters> {
        let menu = self.navigation.discover_menus(session, course_id).await?;
        let Some(list_url) = menu.url_for(content_type) else {
            debug!(course_id, %content_type, "no menu entry, nothing to sync");
            return Ok(SyncCounters::default());
        };
        let Some(parser) = self.parsers.for_type(content_type) else {
            debug!(%content_type, "no parser registered");
            return Ok(SyncCounters::default());
        };

        let list = session.get(list_url, None).await?;
        let rows = parser.parse_list(&list.text())?;

        let mut counters = SyncCounters::default();
        let mut attempted = HashSet::new();

        for row in rows {
            counters.seen += 1;
            let summary = match row {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(course_id, %content_type, error = %e, "list row unreadable");
                    counters.errors += 1;
                    continue;
                }
            };
            if known_ids.contains(&summary.remote_id) || !attempted.insert(summary.remote_id.clone())
            {
                continue;
            }

            let remote_id = summary.remote_id.clone();
            match self
                .sync_item(session, course_id, parser, &list, summary, mode)
                .await
            {
                Ok(ItemOutcome::Stored) => counters.new += 1,
                Ok(ItemOutcome::AlreadyStored) => {
                    debug!(course_id, %content_type, remote_id = %remote_id, "already stored")
                }
                Ok(ItemOutcome::Incomplete) => counters.errors += 1,
                Err(e) if e.is_authentication() => return Err(e),
                Err(e) => {
                    warn!(
                        course_id,
                        %content_type,
                        remote_id = %remote_id,
                        error = %e,
                        "item sync failed"
                    );
                    counters.errors += 1;
                }
            }
        }

        info!(course_id, %content_type, %counters, "content synced");
        Ok(counters)
    }

    /// Fetch, parse and persist one unseen item.
    async fn sync_item(
        &self,
        session: &Session,
        course_id: &str,
        parser: &dyn ContentParser,
        list: &Document,
        summary: Summary,
        mode: SyncMode,
    ) -> Result<ItemOutcome> {
        // Single-page types carry their body on the list page itself.
        let (html, detail_url) = if summary.detail_url.is_empty() {
            (list.text(), list.url.clone())
        } else {
            let url = resolve_link(&list.url, &summary.detail_url);
            let doc = session.get(&url, Some(&list.url)).await?;
            (doc.text(), doc.url)
        };

        let detail = parser.parse_detail(&html)?;
        let refs: Vec<AttachmentRef> = detail
            .attachments
            .iter()
            .map(|a| AttachmentRef {
                name: a.name.clone(),
                url: resolve_link(&detail_url, &a.url),
            })
            .collect();

        let mut item = ContentItem::from_parts(course_id, parser.content_type(), summary, detail);
        item.detail_url = detail_url;

        if !refs.is_empty() {
            let mut batch = self.attachments.process(session, &item.key, &refs).await;
            if let Some(lost) = batch.failures.iter().position(|(_, e)| e.is_authentication()) {
                return Err(batch.failures.swap_remove(lost).1);
            }
            for (file_name, error) in &batch.failures {
                warn!(
                    course_id,
                    content_type = %item.key.content_type,
                    remote_id = %item.key.remote_id,
                    file_name = %file_name,
                    error = %error,
                    "attachment failed"
                );
            }
            if !batch.is_complete() {
                item.status = SyncStatus::Error;
            }
            item.attachments = batch.records;
        }

        let written = match mode {
            SyncMode::Incremental => self.store.insert_content_item(&item)?,
            SyncMode::Refresh => {
                self.store.replace_content_item(&item)?;
                true
            }
        };
        Ok(match (written, item.status) {
            (false, _) => ItemOutcome::AlreadyStored,
            (true, SyncStatus::Error) => ItemOutcome::Incomplete,
            (true, _) => ItemOutcome::Stored,
        })
    }
}
