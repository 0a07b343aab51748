use std::sync::Arc;

use crate::app::error::{Result, SatchelError};
use crate::config::Config;
use crate::credentials::CredentialsProvider;
use crate::navigation::NavigationResolver;
use crate::parser::ParserSet;
use crate::portal::{HttpPortalFactory, PortalFactory};
use crate::session::SessionRegistry;
use crate::storage::{FsObjectStorage, ObjectStorage};
use crate::store::{SqliteStore, Store};
use crate::sync::{AttachmentPipeline, ContentSynchronizer, SyncEngine, SyncTaskRegistry};

/// Wires the sync engine together once per process.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionRegistry>,
    pub navigation: Arc<NavigationResolver>,
    pub synchronizer: Arc<ContentSynchronizer>,
    pub tasks: Arc<SyncTaskRegistry>,
}

impl AppContext {
    /// Production wiring: SQLite store, filesystem objects, HTTP portal.
    pub fn new(config: Config, credentials: Arc<dyn CredentialsProvider>) -> Result<Self> {
        if let Some(parent) = config.storage.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&config.storage.database_path)?);
        let objects: Arc<dyn ObjectStorage> =
            Arc::new(FsObjectStorage::new(&config.storage.objects_dir));

        config.portal.base_url().map_err(|e| {
            SatchelError::Config(format!("portal.base_url {:?}: {}", config.portal.base_url, e))
        })?;
        let factory: Arc<dyn PortalFactory> =
            Arc::new(HttpPortalFactory::new(config.portal.clone()));

        Ok(Self::with_components(config, credentials, factory, store, objects))
    }

    /// Wire from explicit collaborators.
    pub fn with_components(
        config: Config,
        credentials: Arc<dyn CredentialsProvider>,
        factory: Arc<dyn PortalFactory>,
        store: Arc<dyn Store>,
        objects: Arc<dyn ObjectStorage>,
    ) -> Self {
        let parsers = Arc::new(ParserSet::from_config(&config.parsers));
        let sessions = Arc::new(SessionRegistry::new(
            factory,
            config.portal.session_freshness(),
        ));
        let navigation = Arc::new(NavigationResolver::new(
            config.navigation.clone(),
            parsers.clone(),
        ));
        let synchronizer = Arc::new(ContentSynchronizer::new(
            navigation.clone(),
            parsers,
            AttachmentPipeline::new(store.clone(), objects),
            store.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            sessions.clone(),
            credentials,
            navigation.clone(),
            synchronizer.clone(),
            store.clone(),
        ));
        let tasks = Arc::new(SyncTaskRegistry::new(
            engine,
            config.sync.finished_task_retention,
        ));

        Self {
            config,
            store,
            sessions,
            navigation,
            synchronizer,
            tasks,
        }
    }

    /// Cancel running tasks and close every session.
    pub async fn shutdown(&self) {
        let canceled = self.tasks.cancel_all();
        if canceled > 0 {
            tracing::info!(canceled, "canceled running sync tasks");
        }
        self.sessions.close_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, StaticCredentials};
    use crate::domain::{SyncScope, TaskState};
    use crate::sync::tests::{portal_with_room, route_notices};
    use crate::test_utils::{FakePortalFactory, MemoryObjectStorage, PASSWORD};

    #[tokio::test]
    async fn test_components_share_one_store_and_registry() {
        let portal = portal_with_room();
        route_notices(&portal, &[1, 2]);
        let credentials =
            StaticCredentials::new().with("u1", Credentials::new("20231234", PASSWORD));
        let ctx = AppContext::with_components(
            Config::default(),
            Arc::new(credentials),
            FakePortalFactory::new(portal.clone()),
            Arc::new(SqliteStore::in_memory().unwrap()),
            MemoryObjectStorage::new(),
        );

        let id = ctx.tasks.start(SyncScope::course("u1", "C1"));
        let task = ctx.tasks.wait(&id).await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(ctx.store.items_for_course("C1", None).unwrap().len(), 2);
        assert_eq!(ctx.sessions.active_users().await, vec!["u1"]);

        ctx.shutdown().await;
        assert!(ctx.sessions.is_empty().await);
        assert!(portal.is_closed());
    }

    #[test]
    fn test_new_creates_database_under_storage_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database_path = dir.path().join("db").join("satchel.db");
        config.storage.objects_dir = dir.path().join("objects");

        let ctx = AppContext::new(config, Arc::new(StaticCredentials::new())).unwrap();
        assert!(dir.path().join("db").join("satchel.db").exists());
        assert!(ctx.store.courses_for_user("u1").unwrap().is_empty());
    }
}
