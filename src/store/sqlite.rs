use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, SatchelError};
use crate::domain::{
    AttachmentKey, AttachmentRecord, ContentItem, ContentKey, ContentType, Course, SyncStatus,
};
use crate::store::Store;

const ITEM_COLUMNS: &str = "course_id, content_type, remote_id, title, author, posted_at, \
     body_html, body_text, detail_url, extra, status, synced_at";

/// Complete rows are never touched again; rows left in `error` status are
/// overwritten by the next successful sync of the same key.
const RETRY_ERRORED_ITEM: &str = "ON CONFLICT(course_id, content_type, remote_id) DO UPDATE SET \
     title = excluded.title, author = excluded.author, posted_at = excluded.posted_at, \
     body_html = excluded.body_html, body_text = excluded.body_text, \
     detail_url = excluded.detail_url, extra = excluded.extra, status = excluded.status, \
     synced_at = excluded.synced_at \
     WHERE content_items.status = 'error'";

const ATTACHMENT_COLUMNS: &str = "course_id, content_type, remote_id, file_name, byte_len, \
     media_type, storage_ref, origin_url, sha256, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations.to_latest(&mut conn)?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SatchelError::Storage(format!("connection lock poisoned: {}", e)))
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn content_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ContentType> {
        let raw: String = row.get(idx)?;
        raw.parse::<ContentType>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
    }

    fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ContentItem> {
        let extra: String = row.get(9)?;
        let status: String = row.get(10)?;
        Ok(ContentItem {
            key: ContentKey {
                course_id: row.get(0)?,
                content_type: Self::content_type_at(row, 1)?,
                remote_id: row.get(2)?,
            },
            title: row.get(3)?,
            author: row.get(4)?,
            posted_at: row.get(5)?,
            body_html: row.get(6)?,
            body_text: row.get(7)?,
            detail_url: row.get(8)?,
            extra: serde_json::from_str::<BTreeMap<String, String>>(&extra).unwrap_or_default(),
            attachments: Vec::new(),
            status: SyncStatus::parse(&status),
            synced_at: row
                .get::<_, String>(11)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn row_to_attachment(row: &Row<'_>) -> rusqlite::Result<AttachmentRecord> {
        Ok(AttachmentRecord {
            key: AttachmentKey {
                course_id: row.get(0)?,
                content_type: Self::content_type_at(row, 1)?,
                remote_id: row.get(2)?,
                file_name: row.get(3)?,
            },
            byte_len: row.get::<_, i64>(4)?.max(0) as u64,
            media_type: row.get(5)?,
            storage_ref: row.get(6)?,
            origin_url: row.get(7)?,
            sha256: row.get(8)?,
            created_at: row
                .get::<_, String>(9)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn load_attachments(conn: &Connection, key: &ContentKey) -> Result<Vec<AttachmentRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM attachments
             WHERE course_id = ?1 AND content_type = ?2 AND remote_id = ?3
             ORDER BY file_name",
            ATTACHMENT_COLUMNS
        ))?;
        let records = stmt
            .query_map(
                params![key.course_id, key.content_type.as_str(), key.remote_id],
                Self::row_to_attachment,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Items stored with missing attachments keep `error` status until a
    /// later sync completes them.
    fn stored_status(item: &ContentItem) -> SyncStatus {
        match item.status {
            SyncStatus::Error => SyncStatus::Error,
            _ => SyncStatus::Persisted,
        }
    }

    fn write_item(
        conn: &Connection,
        verb: &str,
        on_conflict: &str,
        item: &ContentItem,
    ) -> Result<usize> {
        let extra = serde_json::to_string(&item.extra)
            .map_err(|e| SatchelError::Storage(format!("cannot encode extra fields: {}", e)))?;
        let written = conn.execute(
            &format!(
                "{} INTO content_items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) {}",
                verb, ITEM_COLUMNS, on_conflict
            ),
            params![
                item.key.course_id,
                item.key.content_type.as_str(),
                item.key.remote_id,
                item.title,
                item.author,
                item.posted_at,
                item.body_html,
                item.body_text,
                item.detail_url,
                extra,
                Self::stored_status(item).as_str(),
                item.synced_at.to_rfc3339(),
            ],
        )?;
        Ok(written)
    }
}

impl Store for SqliteStore {
    fn upsert_courses(&self, user_id: &str, courses: &[Course]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        for course in courses {
            tx.execute(
                "INSERT INTO courses (user_id, course_id, title, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, course_id) DO UPDATE SET title = ?3, updated_at = ?4",
                params![user_id, course.id, course.title, now],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn courses_for_user(&self, user_id: &str) -> Result<Vec<Course>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT course_id, title FROM courses WHERE user_id = ?1 ORDER BY title, course_id",
        )?;
        let courses = stmt
            .query_map(params![user_id], |row| {
                Ok(Course {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn known_item_ids(&self, course_id: &str, content_type: ContentType) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT remote_id FROM content_items
             WHERE course_id = ?1 AND content_type = ?2 AND status != 'error'",
        )?;
        let ids = stmt
            .query_map(params![course_id, content_type.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(ids)
    }

    fn insert_content_item(&self, item: &ContentItem) -> Result<bool> {
        let conn = self.conn()?;
        let written = Self::write_item(&conn, "INSERT", RETRY_ERRORED_ITEM, item)?;
        Ok(written > 0)
    }

    fn replace_content_item(&self, item: &ContentItem) -> Result<()> {
        let conn = self.conn()?;
        Self::write_item(&conn, "INSERT OR REPLACE", "", item)?;
        Ok(())
    }

    fn get_content_item(&self, key: &ContentKey) -> Result<Option<ContentItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM content_items
                     WHERE course_id = ?1 AND content_type = ?2 AND remote_id = ?3",
                    ITEM_COLUMNS
                ),
                params![key.course_id, key.content_type.as_str(), key.remote_id],
                Self::row_to_item,
            )
            .optional()?;

        match item {
            Some(mut item) => {
                item.attachments = Self::load_attachments(&conn, &item.key)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn items_for_course(
        &self,
        course_id: &str,
        content_type: Option<ContentType>,
    ) -> Result<Vec<ContentItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM content_items
             WHERE course_id = ?1 AND (?2 IS NULL OR content_type = ?2)
             ORDER BY content_type, synced_at DESC, remote_id",
            ITEM_COLUMNS
        ))?;
        let mut items = stmt
            .query_map(
                params![course_id, content_type.map(|ct| ct.as_str())],
                Self::row_to_item,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for item in &mut items {
            item.attachments = Self::load_attachments(&conn, &item.key)?;
        }
        Ok(items)
    }

    fn find_attachment(&self, key: &AttachmentKey) -> Result<Option<AttachmentRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM attachments
                     WHERE course_id = ?1 AND content_type = ?2 AND remote_id = ?3 AND file_name = ?4",
                    ATTACHMENT_COLUMNS
                ),
                params![
                    key.course_id,
                    key.content_type.as_str(),
                    key.remote_id,
                    key.file_name
                ],
                Self::row_to_attachment,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_attachment(&self, record: &AttachmentRecord) -> Result<bool> {
        let conn = self.conn()?;
        let written = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO attachments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                ATTACHMENT_COLUMNS
            ),
            params![
                record.key.course_id,
                record.key.content_type.as_str(),
                record.key.remote_id,
                record.key.file_name,
                record.byte_len as i64,
                record.media_type,
                record.storage_ref,
                record.origin_url,
                record.sha256,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(written > 0)
    }

    fn attachments_for_item(&self, key: &ContentKey) -> Result<Vec<AttachmentRecord>> {
        let conn = self.conn()?;
        Self::load_attachments(&conn, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Detail, Summary};

    fn item(course: &str, ct: ContentType, id: &str, title: &str) -> ContentItem {
        let summary = Summary::new(id, title, format!("/view?id={}", id));
        let detail = Detail {
            body_text: format!("body of {}", id),
            ..Default::default()
        };
        ContentItem::from_parts(course, ct, summary, detail)
    }

    fn attachment(item: &ContentKey, name: &str, storage_ref: &str) -> AttachmentRecord {
        AttachmentRecord {
            key: AttachmentKey::new(item, name),
            byte_len: 42,
            media_type: "application/pdf".into(),
            storage_ref: storage_ref.into(),
            origin_url: format!("https://portal.test/files/{}", name),
            sha256: AttachmentRecord::digest(name.as_bytes()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get_item() {
        let store = SqliteStore::in_memory().unwrap();
        let mut notice = item("C1", ContentType::Notice, "7", "Midterm");
        notice.extra.insert("pinned".into(), "true".into());

        assert!(store.insert_content_item(&notice).unwrap());

        let loaded = store.get_content_item(&notice.key).unwrap().unwrap();
        assert_eq!(loaded.title, "Midterm");
        assert_eq!(loaded.body_text, "body of 7");
        assert_eq!(loaded.status, SyncStatus::Persisted);
        assert_eq!(loaded.extra.get("pinned").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_duplicate_item_ignored() {
        let store = SqliteStore::in_memory().unwrap();
        let original = item("C1", ContentType::Notice, "7", "Original");
        let dup = item("C1", ContentType::Notice, "7", "Different");

        assert!(store.insert_content_item(&original).unwrap());
        assert!(!store.insert_content_item(&dup).unwrap());

        let loaded = store.get_content_item(&original.key).unwrap().unwrap();
        assert_eq!(loaded.title, "Original");
    }

    #[test]
    fn test_errored_item_is_retried() {
        let store = SqliteStore::in_memory().unwrap();
        let mut partial = item("C1", ContentType::Material, "5", "Week 5");
        partial.status = SyncStatus::Error;
        assert!(store.insert_content_item(&partial).unwrap());

        let loaded = store.get_content_item(&partial.key).unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::Error);
        assert!(store
            .known_item_ids("C1", ContentType::Material)
            .unwrap()
            .is_empty());

        let complete = item("C1", ContentType::Material, "5", "Week 5 (all files)");
        assert!(store.insert_content_item(&complete).unwrap());
        let loaded = store.get_content_item(&partial.key).unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::Persisted);
        assert_eq!(loaded.title, "Week 5 (all files)");
        assert_eq!(
            store.known_item_ids("C1", ContentType::Material).unwrap(),
            HashSet::from(["5".to_string()])
        );

        // Complete rows stay as they are.
        assert!(!store.insert_content_item(&partial).unwrap());
        let loaded = store.get_content_item(&partial.key).unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::Persisted);
    }

    #[test]
    fn test_replace_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_content_item(&item("C1", ContentType::Syllabus, "syllabus", "Old"))
            .unwrap();
        store
            .replace_content_item(&item("C1", ContentType::Syllabus, "syllabus", "New"))
            .unwrap();

        let key = ContentKey::new("C1", ContentType::Syllabus, "syllabus");
        assert_eq!(store.get_content_item(&key).unwrap().unwrap().title, "New");
        assert_eq!(store.items_for_course("C1", None).unwrap().len(), 1);
    }

    #[test]
    fn test_known_ids_scoped_by_course_and_type() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_content_item(&item("C1", ContentType::Notice, "1", "a")).unwrap();
        store.insert_content_item(&item("C1", ContentType::Notice, "2", "b")).unwrap();
        store.insert_content_item(&item("C1", ContentType::Material, "3", "c")).unwrap();
        store.insert_content_item(&item("C2", ContentType::Notice, "4", "d")).unwrap();

        let ids = store.known_item_ids("C1", ContentType::Notice).unwrap();
        assert_eq!(ids, HashSet::from(["1".to_string(), "2".to_string()]));
        assert!(store
            .known_item_ids("C3", ContentType::Notice)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_items_for_course_filter() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_content_item(&item("C1", ContentType::Notice, "1", "a")).unwrap();
        store.insert_content_item(&item("C1", ContentType::Material, "2", "b")).unwrap();

        assert_eq!(store.items_for_course("C1", None).unwrap().len(), 2);
        let materials = store
            .items_for_course("C1", Some(ContentType::Material))
            .unwrap();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].key.remote_id, "2");
    }

    #[test]
    fn test_attachment_dedup_by_key() {
        let store = SqliteStore::in_memory().unwrap();
        let key = ContentKey::new("C1", ContentType::Material, "5");

        assert!(store
            .insert_attachment(&attachment(&key, "slides.pdf", "ref-1"))
            .unwrap());
        assert!(!store
            .insert_attachment(&attachment(&key, "slides.pdf", "ref-2"))
            .unwrap());

        let found = store
            .find_attachment(&AttachmentKey::new(&key, "slides.pdf"))
            .unwrap()
            .unwrap();
        assert_eq!(found.storage_ref, "ref-1");
        assert_eq!(found.byte_len, 42);
        assert!(store
            .find_attachment(&AttachmentKey::new(&key, "other.pdf"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_item_loads_its_attachments() {
        let store = SqliteStore::in_memory().unwrap();
        let material = item("C1", ContentType::Material, "5", "Week 5");
        store
            .insert_attachment(&attachment(&material.key, "b.pdf", "ref-b"))
            .unwrap();
        store
            .insert_attachment(&attachment(&material.key, "a.pdf", "ref-a"))
            .unwrap();
        let other = ContentKey::new("C1", ContentType::Material, "6");
        store
            .insert_attachment(&attachment(&other, "a.pdf", "ref-other"))
            .unwrap();
        store.insert_content_item(&material).unwrap();

        let loaded = store.get_content_item(&material.key).unwrap().unwrap();
        let names: Vec<_> = loaded
            .attachments
            .iter()
            .map(|a| a.key.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
        assert_eq!(store.attachments_for_item(&other).unwrap().len(), 1);
    }

    #[test]
    fn test_courses_upsert_and_order() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert_courses(
                "u1",
                &[Course::new("C2", "Databases"), Course::new("C1", "Algorithms")],
            )
            .unwrap();
        store
            .upsert_courses("u1", &[Course::new("C2", "Database Systems")])
            .unwrap();
        store
            .upsert_courses("u2", &[Course::new("C9", "Art")])
            .unwrap();

        let courses = store.courses_for_user("u1").unwrap();
        assert_eq!(
            courses,
            vec![
                Course::new("C1", "Algorithms"),
                Course::new("C2", "Database Systems"),
            ]
        );
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("satchel.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store.insert_content_item(&item("C1", ContentType::Notice, "1", "a")).unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.known_item_ids("C1", ContentType::Notice).unwrap().len(), 1);
    }
}
