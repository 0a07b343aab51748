use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::app::{Result, SatchelError};
use crate::domain::{AttachmentKey, AttachmentRecord, AttachmentRef, ContentKey};
use crate::session::Session;
use crate::storage::ObjectStorage;
use crate::store::Store;
use crate::sync::keyed::KeyedMutex;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Outcome of one item's attachments: what got stored and what failed.
#[derive(Debug, Default)]
pub struct AttachmentBatch {
    pub records: Vec<AttachmentRecord>,
    pub failures: Vec<(String, SatchelError)>,
}

impl AttachmentBatch {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Downloads attachments once per dedup key and hands the bytes to object storage.
pub struct AttachmentPipeline {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStorage>,
    in_flight: KeyedMutex<AttachmentKey>,
}

impl AttachmentPipeline {
    pub fn new(store: Arc<dyn Store>, objects: Arc<dyn ObjectStorage>) -> Self {
        Self {
            store,
            objects,
            in_flight: KeyedMutex::new(),
        }
    }

    pub async fn process(
        &self,
        session: &Session,
        item: &ContentKey,
        refs: &[AttachmentRef],
    ) -> AttachmentBatch {
        let mut batch = AttachmentBatch::default();

        for attachment in refs {
            match self.process_one(session, item, attachment).await {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    warn!(
                        course_id = %item.course_id,
                        content_type = %item.content_type,
                        remote_id = %item.remote_id,
                        file_name = %attachment.name,
                        error = %e,
                        "attachment failed"
                    );
                    batch.failures.push((attachment.name.clone(), e));
                }
            }
        }

        batch
    }

    async fn process_one(
        &self,
        session: &Session,
        item: &ContentKey,
        attachment: &AttachmentRef,
    ) -> Result<AttachmentRecord> {
        let key = AttachmentKey::new(item, &attachment.name);
        let _guard = self.in_flight.lock(key.clone()).await;

        if let Some(existing) = self.store.find_attachment(&key)? {
            debug!(key = %key, "attachment already stored");
            return Ok(existing);
        }

        let doc = session.get(&attachment.url, None).await?;
        if doc.is_empty() {
            return Err(SatchelError::EmptyDownload(attachment.url.clone()));
        }

        let sha256 = AttachmentRecord::digest(&doc.body);
        let suggested = format!(
            "{}/{}/{}/{}_{}",
            item.course_id,
            item.content_type,
            item.remote_id,
            &sha256[..12],
            attachment.name
        );
        let storage_ref = self.objects.put(&doc.body, &suggested).await?;

        let record = AttachmentRecord {
            key,
            byte_len: doc.len() as u64,
            media_type: doc
                .content_type
                .as_deref()
                .and_then(|ct| ct.split(';').next())
                .map(str::trim)
                .filter(|ct| !ct.is_empty())
                .unwrap_or(DEFAULT_MEDIA_TYPE)
                .to_string(),
            storage_ref,
            origin_url: attachment.url.clone(),
            sha256,
            created_at: Utc::now(),
        };

        if self.store.insert_attachment(&record)? {
            debug!(key = %record.key, bytes = record.byte_len, "attachment stored");
            Ok(record)
        } else {
            // Another writer got there first; theirs is the record of truth.
            Ok(self.store.find_attachment(&record.key)?.unwrap_or(record))
        }
    }
}
