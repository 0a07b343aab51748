pub mod health;
pub mod registry;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::app::{Result, SatchelError};
use crate::domain::CourseMenu;
use crate::portal::{Document, Method, Portal};

pub use health::spawn_health_monitor;
pub use registry::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Active,
    Expired,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Expired => "expired",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Course rooms entered and menus discovered during one session.
#[derive(Debug, Default)]
pub struct RoomCache {
    entered: HashSet<String>,
    menus: HashMap<String, CourseMenu>,
}

impl RoomCache {
    pub fn has_entered(&self, course_id: &str) -> bool {
        self.entered.contains(course_id)
    }

    pub fn mark_entered(&mut self, course_id: &str) {
        self.entered.insert(course_id.to_string());
    }

    pub fn menu(&self, course_id: &str) -> Option<&CourseMenu> {
        self.menus.get(course_id)
    }

    pub fn store_menu(&mut self, menu: CourseMenu) {
        self.menus.insert(menu.course_id.clone(), menu);
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    last_validated: Option<Instant>,
}

/// One user's authenticated context against the portal.
pub struct Session {
    user_id: String,
    client: Arc<dyn Portal>,
    lifecycle: Mutex<Lifecycle>,
    created_at: DateTime<Utc>,
    rooms: tokio::sync::Mutex<RoomCache>,
}

impl Session {
    pub fn new(user_id: &str, client: Arc<dyn Portal>) -> Self {
        Self {
            user_id: user_id.to_string(),
            client,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Uninitialized,
                last_validated: None,
            }),
            created_at: Utc::now(),
            rooms: tokio::sync::Mutex::new(RoomCache::default()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Log in through the underlying client. Leaves the session `Active` on
    /// success and `Expired` when the portal refuses.
    pub(crate) async fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        self.lifecycle().state = SessionState::Authenticating;
        let outcome = self.client.login(username, password).await;
        match outcome {
            Ok(true) => self.touch(),
            _ => self.lifecycle().state = SessionState::Expired,
        }
        outcome
    }

    /// Record a successful validation.
    pub fn touch(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != SessionState::Closed {
            lifecycle.state = SessionState::Active;
            lifecycle.last_validated = Some(Instant::now());
        }
    }

    /// Validated within `window` and still active.
    pub fn is_fresh(&self, window: Duration) -> bool {
        let lifecycle = self.lifecycle();
        lifecycle.state == SessionState::Active
            && lifecycle
                .last_validated
                .is_some_and(|at| at.elapsed() < window)
    }

    /// Real liveness check against the portal.
    pub async fn probe(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.client.is_authenticated().await {
            self.touch();
            true
        } else {
            self.expire();
            false
        }
    }

    pub fn expire(&self) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != SessionState::Closed {
            lifecycle.state = SessionState::Expired;
        }
    }

    pub async fn close(&self) {
        let already_closed = {
            let mut lifecycle = self.lifecycle();
            let closed = lifecycle.state == SessionState::Closed;
            lifecycle.state = SessionState::Closed;
            closed
        };
        if !already_closed {
            self.client.close().await;
            debug!(user_id = %self.user_id, "session closed");
        }
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<Document> {
        if self.state() == SessionState::Closed {
            return Err(SatchelError::SessionClosed(self.user_id.clone()));
        }
        let outcome = self.client.request(method, url, params, referer).await;
        if outcome.as_ref().is_err_and(SatchelError::is_authentication) {
            self.expire();
        }
        outcome
    }

    pub async fn get(&self, url: &str, referer: Option<&str>) -> Result<Document> {
        self.request(Method::Get, url, &[], referer).await
    }

    /// Room state for this session. Held across the room-entry round trip so
    /// a course is entered once even under concurrent syncs.
    pub async fn rooms(&self) -> tokio::sync::MutexGuard<'_, RoomCache> {
        self.rooms.lock().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}
