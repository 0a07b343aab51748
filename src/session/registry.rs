use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::app::{Result, SatchelError};
use crate::credentials::CredentialsProvider;
use crate::portal::PortalFactory;
use crate::session::Session;

type Slot = Arc<tokio::sync::Mutex<Option<Arc<Session>>>>;

/// At most one live [`Session`] per user.
///
/// Every read or write of a user's slot goes through that user's async
/// mutex, so concurrent callers share one login instead of racing.
pub struct SessionRegistry {
    factory: Arc<dyn PortalFactory>,
    freshness: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn PortalFactory>, freshness: Duration) -> Self {
        Self {
            factory,
            freshness,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, user_id: &str) -> Slot {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    fn all_slots(&self) -> Vec<(String, Slot)> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(user, slot)| (user.clone(), slot.clone()))
            .collect()
    }

    /// Return the user's live session, logging in when there is none or the
    /// existing one fails its liveness probe.
    pub async fn get(
        &self,
        user_id: &str,
        credentials: &dyn CredentialsProvider,
    ) -> Result<Arc<Session>> {
        let slot = self.slot(user_id);
        let mut current = slot.lock().await;

        if let Some(session) = current.as_ref() {
            if session.is_fresh(self.freshness) {
                return Ok(session.clone());
            }
            if session.probe().await {
                debug!(user_id, "session re-validated");
                return Ok(session.clone());
            }
            info!(user_id, state = %session.state(), "session no longer valid, logging in again");
            session.close().await;
            *current = None;
        }

        let creds = credentials.get(user_id).await?;
        let session = Arc::new(Session::new(user_id, self.factory.create()?));

        match session.authenticate(&creds.username, &creds.password).await {
            Ok(true) => {
                info!(user_id, "session established");
                *current = Some(session.clone());
                Ok(session)
            }
            Ok(false) => {
                session.close().await;
                error!(user_id, "portal rejected credentials");
                Err(SatchelError::auth(user_id, "portal rejected credentials"))
            }
            Err(e) => {
                session.close().await;
                error!(user_id, error = %e, "login failed");
                Err(e)
            }
        }
    }

    /// Close and forget the user's session, if any.
    pub async fn invalidate(&self, user_id: &str) {
        let slot = self.slot(user_id);
        let taken = slot.lock().await.take();
        if let Some(session) = taken {
            session.close().await;
            info!(user_id, "session invalidated");
        }
    }

    /// Close a session found dead in the middle of its use. The user's slot
    /// is cleared only if it still holds this session.
    pub async fn discard(&self, session: &Arc<Session>) {
        let slot = self.slot(session.user_id());
        let mut current = slot.lock().await;
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, session)) {
            *current = None;
        }
        session.close().await;
        info!(user_id = %session.user_id(), "session discarded");
    }

    /// Probe every registered session and drop the dead ones. Returns how
    /// many were invalidated.
    pub async fn check_all_health(&self) -> usize {
        let checks = self.all_slots().into_iter().map(|(user_id, slot)| async move {
            let mut current = slot.lock().await;
            let Some(session) = current.as_ref() else {
                return false;
            };
            if session.probe().await {
                return false;
            }
            warn!(user_id = %user_id, "health check failed, dropping session");
            session.close().await;
            *current = None;
            true
        });

        let invalidated = join_all(checks).await.into_iter().filter(|dead| *dead).count();
        if invalidated > 0 {
            info!(invalidated, "health check complete");
        }
        invalidated
    }

    /// Close every session. Used on shutdown.
    pub async fn close_all(&self) {
        for (_, slot) in self.all_slots() {
            let taken = slot.lock().await.take();
            if let Some(session) = taken {
                session.close().await;
            }
        }
    }

    pub async fn active_users(&self) -> Vec<String> {
        let mut users = Vec::new();
        for (user_id, slot) in self.all_slots() {
            if slot.lock().await.as_ref().is_some_and(|s| s.is_active()) {
                users.push(user_id);
            }
        }
        users.sort();
        users
    }

    pub async fn len(&self) -> usize {
        self.active_users().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, StaticCredentials};
    use crate::session::SessionState;
    use crate::test_utils::{FakePortal, FakePortalFactory, PASSWORD};

    fn credentials() -> StaticCredentials {
        StaticCredentials::new()
            .with("u1", Credentials::new("20231234", PASSWORD))
            .with("u2", Credentials::new("20235678", PASSWORD))
            .with("mallory", Credentials::new("mallory", "guess"))
    }

    fn registry(portal: &Arc<FakePortal>, freshness: Duration) -> SessionRegistry {
        SessionRegistry::new(FakePortalFactory::new(portal.clone()), freshness)
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_login() {
        let portal = FakePortal::new();
        portal.set_login_delay(Duration::from_millis(50));
        let registry = Arc::new(registry(&portal, Duration::from_secs(60)));
        let creds = Arc::new(credentials());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = registry.clone();
                let creds = creds.clone();
                tokio::spawn(async move { registry.get("u1", creds.as_ref()).await })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(portal.login_count(), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test]
    async fn test_fresh_session_skips_probe() {
        let portal = FakePortal::new();
        let registry = registry(&portal, Duration::from_secs(60));
        let creds = credentials();

        let first = registry.get("u1", &creds).await.unwrap();
        let second = registry.get("u1", &creds).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(portal.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_session_is_probed_and_kept() {
        let portal = FakePortal::new();
        let registry = registry(&portal, Duration::ZERO);
        let creds = credentials();

        let first = registry.get("u1", &creds).await.unwrap();
        let second = registry.get("u1", &creds).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(portal.probe_count(), 1);
        assert_eq!(portal.login_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_logs_in_again() {
        let portal = FakePortal::new();
        let registry = registry(&portal, Duration::ZERO);
        let creds = credentials();

        let first = registry.get("u1", &creds).await.unwrap();
        portal.expire();
        let second = registry.get("u1", &creds).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), SessionState::Closed);
        assert_eq!(second.state(), SessionState::Active);
        assert_eq!(portal.login_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let portal = FakePortal::new();
        let registry = registry(&portal, Duration::from_secs(60));

        let err = registry.get("mallory", &credentials()).await.unwrap_err();
        assert!(err.is_authentication());
        assert!(registry.is_empty().await);

        let err = registry.get("nobody", &credentials()).await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let portal = FakePortal::new();
        let registry = registry(&portal, Duration::from_secs(60));
        let creds = credentials();

        let session = registry.get("u1", &creds).await.unwrap();
        registry.invalidate("u1").await;
        registry.invalidate("never-seen").await;

        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.active_users().await.is_empty());

        registry.get("u1", &creds).await.unwrap();
        assert_eq!(portal.login_count(), 2);
    }

    #[tokio::test]
    async fn test_health_check_drops_dead_sessions() {
        let portal = FakePortal::new();
        let registry = registry(&portal, Duration::from_secs(60));
        let creds = credentials();

        registry.get("u1", &creds).await.unwrap();
        registry.get("u2", &creds).await.unwrap();
        assert_eq!(registry.active_users().await, vec!["u1", "u2"]);
        assert_eq!(registry.check_all_health().await, 0);

        portal.expire();
        assert_eq!(registry.check_all_health().await, 2);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_discard_only_clears_its_own_session() {
        let portal = FakePortal::new();
        let factory = FakePortalFactory::new(portal.clone());
        let registry = SessionRegistry::new(factory.clone(), Duration::from_secs(60));
        let creds = credentials();

        let dead = registry.get("u1", &creds).await.unwrap();
        registry.discard(&dead).await;
        assert_eq!(dead.state(), SessionState::Closed);
        assert!(registry.is_empty().await);

        let fresh = registry.get("u1", &creds).await.unwrap();
        assert_eq!(factory.created(), 2);
        registry.discard(&dead).await;
        assert!(Arc::ptr_eq(&registry.get("u1", &creds).await.unwrap(), &fresh));
        assert_eq!(factory.created(), 2);
    }

    #[tokio::test]
    async fn test_close_all() {
        let portal = FakePortal::new();
        let registry = registry(&portal, Duration::from_secs(60));
        let session = registry.get("u1", &credentials()).await.unwrap();

        registry.close_all().await;

        assert_eq!(session.state(), SessionState::Closed);
        assert!(portal.is_closed());
        assert!(registry.is_empty().await);
    }
}
