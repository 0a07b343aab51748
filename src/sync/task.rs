use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::app::{Result, SatchelError};
use crate::domain::{SyncScope, SyncTask, TaskState};
use crate::sync::SyncEngine;

/// Shared, lock-protected view of one task, written by its runner.
#[derive(Debug, Clone)]
pub struct TaskProgress(Arc<Mutex<SyncTask>>);

impl TaskProgress {
    pub fn new(task: SyncTask) -> Self {
        Self(Arc::new(Mutex::new(task)))
    }

    fn lock(&self) -> MutexGuard<'_, SyncTask> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update<F: FnOnce(&mut SyncTask)>(&self, f: F) {
        f(&mut self.lock());
    }

    pub fn snapshot(&self) -> SyncTask {
        self.lock().clone()
    }

    fn finish(&self, outcome: std::result::Result<(), String>, canceled: bool) {
        let mut task = self.lock();
        task.finished_at = Some(Utc::now());
        task.state = match outcome {
            Err(e) => {
                task.error = Some(e);
                TaskState::Failed
            }
            Ok(()) if canceled => TaskState::Canceled,
            Ok(()) => TaskState::Completed,
        };
    }
}

struct TaskEntry {
    progress: TaskProgress,
    cancel: CancellationToken,
    done: CancellationToken,
}

#[derive(Default)]
struct TaskTable {
    entries: HashMap<String, TaskEntry>,
    order: VecDeque<String>,
}

/// Every sync runs as a tracked background task: observable through
/// [`status`](Self::status) and stoppable through [`cancel`](Self::cancel).
pub struct SyncTaskRegistry {
    engine: Arc<SyncEngine>,
    retention: usize,
    tasks: Mutex<TaskTable>,
}

impl SyncTaskRegistry {
    pub fn new(engine: Arc<SyncEngine>, retention: usize) -> Self {
        Self {
            engine,
            retention,
            tasks: Mutex::new(TaskTable::default()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, TaskTable> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Launch a sync in the background and return its id right away.
    pub fn start(&self, scope: SyncScope) -> String {
        let id = Uuid::new_v4().to_string();
        let progress = TaskProgress::new(SyncTask::new(id.clone(), scope.clone()));
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        {
            let mut tasks = self.tasks();
            tasks.entries.insert(
                id.clone(),
                TaskEntry {
                    progress: progress.clone(),
                    cancel: cancel.clone(),
                    done: done.clone(),
                },
            );
            tasks.order.push_back(id.clone());
            Self::prune(&mut tasks, self.retention);
        }

        let engine = self.engine.clone();
        let worker = {
            let progress = progress.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                progress.update(|task| {
                    task.state = TaskState::Running;
                    task.started_at = Some(Utc::now());
                });
                engine.run(&scope, &progress, &cancel).await
            })
        };

        let task_id = id.clone();
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("sync worker aborted: {}", e)),
            };
            if let Err(e) = &outcome {
                error!(task_id = %task_id, error = %e, "sync task failed");
            }
            progress.finish(outcome, cancel.is_cancelled());
            info!(task_id = %task_id, state = %progress.snapshot().state, "sync task finished");
            done.cancel();
        });

        info!(task_id = %id, "sync task started");
        id
    }

    pub fn status(&self, task_id: &str) -> Result<SyncTask> {
        self.tasks()
            .entries
            .get(task_id)
            .map(|entry| entry.progress.snapshot())
            .ok_or_else(|| SatchelError::TaskNotFound(task_id.to_string()))
    }

    /// Request cooperative cancellation. `false` when the task is unknown
    /// or already finished.
    pub fn cancel(&self, task_id: &str) -> bool {
        let tasks = self.tasks();
        let Some(entry) = tasks.entries.get(task_id) else {
            return false;
        };
        let mut requested = false;
        entry.progress.update(|task| {
            if !task.state.is_terminal() {
                task.cancel_requested = true;
                requested = true;
            }
        });
        if requested {
            entry.cancel.cancel();
            info!(task_id, "sync task cancel requested");
        }
        requested
    }

    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.tasks().order.iter().cloned().collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Resolve once the task reaches a terminal state.
    pub async fn wait(&self, task_id: &str) -> Result<SyncTask> {
        let (progress, done) = {
            let tasks = self.tasks();
            let entry = tasks
                .entries
                .get(task_id)
                .ok_or_else(|| SatchelError::TaskNotFound(task_id.to_string()))?;
            (entry.progress.clone(), entry.done.clone())
        };
        done.cancelled().await;
        Ok(progress.snapshot())
    }

    /// All tracked tasks, oldest first.
    pub fn list(&self) -> Vec<SyncTask> {
        let tasks = self.tasks();
        tasks
            .order
            .iter()
            .filter_map(|id| tasks.entries.get(id))
            .map(|entry| entry.progress.snapshot())
            .collect()
    }

    /// Drop the oldest finished tasks beyond `retention`.
    fn prune(tasks: &mut TaskTable, retention: usize) {
        let finished: Vec<String> = tasks
            .order
            .iter()
            .filter(|id| {
                tasks
                    .entries
                    .get(*id)
                    .is_some_and(|e| e.progress.snapshot().state.is_terminal())
            })
            .cloned()
            .collect();

        let excess = finished.len().saturating_sub(retention);
        for id in finished.into_iter().take(excess) {
            tasks.entries.remove(&id);
            tasks.order.retain(|other| *other != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::credentials::{Credentials, StaticCredentials};
    use crate::domain::{ContentType, SyncCounters, SyncMode};
    use crate::navigation::{NavigationConfig, NavigationResolver};
    use crate::parser::ParserSet;
    use crate::session::SessionRegistry;
    use crate::store::{SqliteStore, Store};
    use crate::sync::tests::{board, detail, portal_with_room, route_notices};
    use crate::sync::{AttachmentPipeline, ContentSynchronizer};
    use crate::test_utils::{FakePortal, FakePortalFactory, MemoryObjectStorage, PASSWORD};

    struct Fixture {
        portal: Arc<FakePortal>,
        store: Arc<SqliteStore>,
        registry: SyncTaskRegistry,
    }

    fn fixture(portal: Arc<FakePortal>, retention: usize) -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let parsers = Arc::new(ParserSet::default());
        let navigation = Arc::new(NavigationResolver::new(
            NavigationConfig::default(),
            parsers.clone(),
        ));
        let synchronizer = Arc::new(ContentSynchronizer::new(
            navigation.clone(),
            parsers,
            AttachmentPipeline::new(store.clone(), MemoryObjectStorage::new()),
            store.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(
            FakePortalFactory::new(portal.clone()),
            Duration::from_secs(60),
        ));
        let credentials = StaticCredentials::new()
            .with("u1", Credentials::new("20231234", PASSWORD))
            .with("mallory", Credentials::new("mallory", "guess"));
        let engine = Arc::new(SyncEngine::new(
            sessions,
            Arc::new(credentials),
            navigation,
            synchronizer,
            store.clone(),
        ));

        Fixture {
            portal,
            store,
            registry: SyncTaskRegistry::new(engine, retention),
        }
    }

    #[tokio::test]
    async fn test_course_task_completes_with_counters() {
        let portal = portal_with_room();
        route_notices(&portal, &[1, 2, 3]);
        let f = fixture(portal, 8);

        let id = f.registry.start(SyncScope::course("u1", "C1"));
        let task = f.registry.wait(&id).await.unwrap();

        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(
            task.counters[&ContentType::Notice],
            SyncCounters { seen: 3, new: 3, errors: 0 }
        );
        // Materials menu entry exists but its list page is missing.
        assert_eq!(task.counters[&ContentType::Material], SyncCounters::errors(1));
        assert_eq!(task.courses_done, 1);
        assert!(task.started_at.is_some() && task.finished_at.is_some());
        assert_eq!(f.registry.status(&id).unwrap().state, TaskState::Completed);

        let again = f.registry.start(SyncScope::course("u1", "C1"));
        let task = f.registry.wait(&again).await.unwrap();
        assert_eq!(task.counters[&ContentType::Notice].new, 0);
    }

    #[tokio::test]
    async fn test_all_courses_scope_discovers_courses() {
        let portal = portal_with_room();
        route_notices(&portal, &[1]);
        portal.route(
            "/mypage",
            r#"<div class="course-list">
                <a class="course-link" data-course-id="C1">Operating Systems</a>
                <a class="course-link" data-course-id="C2">Closed Course</a>
            </div>"#,
        );
        let f = fixture(portal, 8);

        let id = f.registry.start(SyncScope::all_courses("u1"));
        let task = f.registry.wait(&id).await.unwrap();

        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.courses_total, 2);
        assert_eq!(task.courses_done, 1);
        assert_eq!(task.course_errors, 1);
        assert_eq!(f.store.courses_for_user("u1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bad_credentials_fail_the_task() {
        let f = fixture(portal_with_room(), 8);

        let id = f.registry.start(SyncScope::course("mallory", "C1"));
        let task = f.registry.wait(&id).await.unwrap();

        assert_eq!(task.state, TaskState::Failed);
        assert!(task.error.unwrap().contains("mallory"));
        assert!(task.counters.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_between_units() {
        let portal = portal_with_room();
        route_notices(&portal, &[1, 2]);
        portal.set_login_delay(Duration::from_millis(50));
        let f = fixture(portal, 8);

        let id = f.registry.start(SyncScope::course("u1", "C1"));
        assert!(f.registry.cancel(&id));
        let task = f.registry.wait(&id).await.unwrap();

        assert_eq!(task.state, TaskState::Canceled);
        assert!(task.cancel_requested);
        assert!(task.counters.is_empty());
        assert!(f.store.items_for_course("C1", None).unwrap().is_empty());
        assert!(!f.registry.cancel(&id));
    }

    #[tokio::test]
    async fn test_cancel_lets_current_content_type_finish() {
        let portal = portal_with_room();
        route_notices(&portal, &[1, 2]);
        portal.route("/material/list", &board("material", &[10]));
        portal.route("/material/view?id=10", &detail(10, None));
        portal.delay("/notice/view?id=2", Duration::from_millis(200));
        let f = fixture(portal, 8);

        let id = f.registry.start(SyncScope::course("u1", "C1"));
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.portal.request_count("/notice/view?id=2") == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second notice is being fetched");
        assert!(f.registry.cancel(&id));
        let task = f.registry.wait(&id).await.unwrap();

        assert_eq!(task.state, TaskState::Canceled);
        assert_eq!(
            task.counters[&ContentType::Notice],
            SyncCounters { seen: 2, new: 2, errors: 0 }
        );
        assert!(!task.counters.contains_key(&ContentType::Material));
        assert_eq!(task.courses_done, 0);

        let notices = f.store.items_for_course("C1", Some(ContentType::Notice)).unwrap();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.body_text.starts_with("Body of post")));
        assert_eq!(f.portal.request_count("/material/list"), 0);
        assert_eq!(f.portal.request_count("/plan"), 0);
        assert!(f.store.items_for_course("C1", Some(ContentType::Material)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lost_session_fails_the_task() {
        let portal = portal_with_room();
        route_notices(&portal, &[1]);
        portal.redirect_to_login("/material/list");
        let f = fixture(portal, 8);

        let id = f.registry.start(SyncScope::course("u1", "C1"));
        let task = f.registry.wait(&id).await.unwrap();

        assert_eq!(task.state, TaskState::Failed);
        assert!(task.error.unwrap().contains("login page"));
        // Work done before the session was lost stays.
        assert_eq!(task.counters[&ContentType::Notice].new, 1);
        assert_eq!(f.store.known_item_ids("C1", ContentType::Notice).unwrap().len(), 1);
        assert_eq!(f.portal.request_count("/plan"), 0);
        assert!(f.registry.engine().sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_refresh_scope_rewrites_items() {
        let portal = portal_with_room();
        route_notices(&portal, &[1]);
        let f = fixture(portal, 8);
        let first = f.registry.start(SyncScope::course("u1", "C1"));
        f.registry.wait(&first).await.unwrap();

        f.portal.route("/notice/list", &board("notice", &[1]));
        f.portal.route("/notice/view?id=1", &detail(1, None).replace("Body of", "Edited"));
        let id = f
            .registry
            .start(SyncScope::course("u1", "C1").with_mode(SyncMode::Refresh));
        let task = f.registry.wait(&id).await.unwrap();

        assert_eq!(task.counters[&ContentType::Notice].new, 1);
        let items = f.store.items_for_course("C1", Some(ContentType::Notice)).unwrap();
        assert_eq!(items[0].body_text, "Edited post 1");
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let f = fixture(FakePortal::new(), 8);
        assert!(matches!(
            f.registry.status("nope"),
            Err(SatchelError::TaskNotFound(_))
        ));
        assert!(!f.registry.cancel("nope"));
        assert!(f.registry.wait("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_finished_tasks_are_pruned() {
        let portal = portal_with_room();
        route_notices(&portal, &[1]);
        let f = fixture(portal, 1);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = f.registry.start(SyncScope::course("u1", "C1"));
            f.registry.wait(&id).await.unwrap();
            ids.push(id);
        }
        let last = f.registry.start(SyncScope::course("u1", "C1"));
        f.registry.wait(&last).await.unwrap();

        let listed: Vec<String> = f.registry.list().into_iter().map(|t| t.id).collect();
        assert_eq!(listed, vec![ids[2].clone(), last]);
        assert!(f.registry.status(&ids[0]).is_err());
    }
}
