use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::Result;
use crate::credentials::CredentialsProvider;
use crate::domain::{ContentType, SyncCounters, SyncMode, SyncScope, SyncTarget};
use crate::navigation::NavigationResolver;
use crate::session::{Session, SessionRegistry};
use crate::store::Store;
use crate::sync::{ContentSynchronizer, TaskProgress};

/// Runs one [`SyncScope`]: log in, walk courses sequentially and, inside a
/// course, content types sequentially.
pub struct SyncEngine {
    sessions: Arc<SessionRegistry>,
    credentials: Arc<dyn CredentialsProvider>,
    navigation: Arc<NavigationResolver>,
    synchronizer: Arc<ContentSynchronizer>,
    store: Arc<dyn Store>,
}

impl SyncEngine {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        credentials: Arc<dyn CredentialsProvider>,
        navigation: Arc<NavigationResolver>,
        synchronizer: Arc<ContentSynchronizer>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            sessions,
            credentials,
            navigation,
            synchronizer,
            store,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn synchronizer(&self) -> &Arc<ContentSynchronizer> {
        &self.synchronizer
    }

    /// Cancellation is checked before login and at the top of every course
    /// and content type; an item already in progress always finishes.
    ///
    /// Only a failed login, a session lost mid-run, or failed course
    /// discovery for an all-courses scope fails the run. Everything below
    /// that is counted and skipped.
    pub async fn run(
        &self,
        scope: &SyncScope,
        progress: &TaskProgress,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let user_id = scope.user_id.as_str();
        if cancel.is_cancelled() {
            return Ok(());
        }

        let session = self
            .sessions
            .get(user_id, self.credentials.as_ref())
            .await
            .inspect_err(|e| error!(user_id, error = %e, "cannot sync without a session"))?;

        let outcome = self.run_courses(&session, scope, progress, cancel).await;
        if let Err(e) = &outcome {
            if e.is_authentication() {
                error!(user_id, error = %e, "session lost during sync");
                self.sessions.discard(&session).await;
            }
        }
        outcome
    }

    async fn run_courses(
        &self,
        session: &Session,
        scope: &SyncScope,
        progress: &TaskProgress,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let user_id = scope.user_id.as_str();
        let course_ids: Vec<String> = match &scope.target {
            SyncTarget::Course(course_id) => vec![course_id.clone()],
            SyncTarget::AllCourses => {
                let courses = self.navigation.list_courses(session).await?;
                self.store.upsert_courses(user_id, &courses)?;
                courses.into_iter().map(|c| c.id).collect()
            }
        };
        progress.update(|task| task.courses_total = course_ids.len());

        'courses: for course_id in &course_ids {
            if cancel.is_cancelled() {
                info!(user_id, "sync canceled between courses");
                break;
            }

            match self.navigation.discover_menus(session, course_id).await {
                Ok(_) => {}
                Err(e) if e.is_authentication() => return Err(e),
                Err(e) => {
                    warn!(user_id, course_id = %course_id, error = %e, "course room unreachable");
                    progress.update(|task| task.course_errors += 1);
                    continue;
                }
            }

            for content_type in ContentType::ALL {
                if cancel.is_cancelled() {
                    info!(user_id, course_id = %course_id, "sync canceled between content types");
                    break 'courses;
                }

                let counters = self
                    .sync_one(session, course_id, content_type, scope.mode)
                    .await?;
                progress.update(|task| task.record(content_type, counters));
            }

            progress.update(|task| task.courses_done += 1);
        }

        let totals = progress.snapshot().totals();
        info!(user_id, %totals, courses = course_ids.len(), "sync run finished");
        Ok(())
    }

    /// One content type of one course. Authentication errors propagate;
    /// any other failure becomes a single counted error.
    async fn sync_one(
        &self,
        session: &Session,
        course_id: &str,
        content_type: ContentType,
        mode: SyncMode,
    ) -> Result<SyncCounters> {
        let known = match mode {
            SyncMode::Incremental => match self.store.known_item_ids(course_id, content_type) {
                Ok(known) => known,
                Err(e) => {
                    warn!(course_id, %content_type, error = %e, "cannot read known ids");
                    return Ok(SyncCounters::errors(1));
                }
            },
            SyncMode::Refresh => HashSet::new(),
        };

        match self
            .synchronizer
            .sync_with_mode(session, course_id, content_type, &known, mode)
            .await
        {
            Ok(counters) => Ok(counters),
            Err(e) if e.is_authentication() => Err(e),
            Err(e) => {
                warn!(course_id, %content_type, error = %e, "content type sync failed");
                Ok(SyncCounters::errors(1))
            }
        }
    }
}
