//! In-process fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::{Result, SatchelError};
use crate::portal::{Document, Method, Portal, PortalFactory};
use crate::storage::ObjectStorage;

pub const BASE: &str = "https://portal.test";
pub const PASSWORD: &str = "secret";

enum FakeResponse {
    Html(String),
    File { bytes: Vec<u8>, content_type: String },
    Fail(String),
    /// What the portal does to a request from a forgotten session.
    LoginRedirect,
}

/// Scripted portal: canned pages by path, counters for logins, probes and
/// requests, and a switch to expire the server-side session.
pub struct FakePortal {
    routes: Mutex<HashMap<String, FakeResponse>>,
    requests: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    logins: AtomicUsize,
    probes: AtomicUsize,
    alive: AtomicBool,
    closed: AtomicBool,
    login_delay_ms: AtomicU64,
    validated: Mutex<Option<DateTime<Utc>>>,
}

impl FakePortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            logins: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            alive: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            login_delay_ms: AtomicU64::new(0),
            validated: Mutex::new(None),
        })
    }

    fn normalize(url: &str) -> String {
        let path = url.strip_prefix(BASE).unwrap_or(url);
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        }
    }

    pub fn route(&self, path: &str, html: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(Self::normalize(path), FakeResponse::Html(html.to_string()));
    }

    pub fn route_file(&self, path: &str, bytes: &[u8], content_type: &str) {
        self.routes.lock().unwrap().insert(
            Self::normalize(path),
            FakeResponse::File {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(Self::normalize(path), FakeResponse::Fail(message.to_string()));
    }

    /// Hold every answer for `path` back by `delay`. The request is counted
    /// before the wait.
    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(Self::normalize(path), delay);
    }

    pub fn redirect_to_login(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(Self::normalize(path), FakeResponse::LoginRedirect);
    }

    pub fn request_count(&self, path: &str) -> usize {
        let path = Self::normalize(path);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|p| **p == path)
            .count()
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Server forgets the session; the next probe fails.
    pub fn expire(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        self.login_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Portal for FakePortal {
    async fn login(&self, _username: &str, password: &str) -> Result<bool> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let delay = self.login_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if password != PASSWORD {
            return Ok(false);
        }
        self.closed.store(false, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
        *self.validated.lock().unwrap() = Some(Utc::now());
        Ok(true)
    }

    async fn is_authenticated(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    async fn request(
        &self,
        _method: Method,
        url: &str,
        _params: &[(&str, &str)],
        _referer: Option<&str>,
    ) -> Result<Document> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SatchelError::SessionClosed(BASE.to_string()));
        }
        let path = Self::normalize(url);
        self.requests.lock().unwrap().push(path.clone());
        let delay = self.delays.lock().unwrap().get(&path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let routes = self.routes.lock().unwrap();
        let (body, content_type) = match routes.get(&path) {
            Some(FakeResponse::Html(html)) => (html.as_bytes().to_vec(), "text/html".to_string()),
            Some(FakeResponse::File {
                bytes,
                content_type,
            }) => (bytes.clone(), content_type.clone()),
            Some(FakeResponse::Fail(message)) => {
                return Err(SatchelError::Transport(message.clone()))
            }
            Some(FakeResponse::LoginRedirect) => {
                self.alive.store(false, Ordering::SeqCst);
                return Err(SatchelError::auth(
                    "fake",
                    format!("{} answered with the login page", path),
                ));
            }
            None => {
                return Err(SatchelError::Transport(format!(
                    "GET {} returned HTTP 404",
                    path
                )))
            }
        };

        Ok(Document {
            url: format!("{}{}", BASE, path),
            status: 200,
            content_type: Some(content_type),
            body,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn last_validated(&self) -> Option<DateTime<Utc>> {
        *self.validated.lock().unwrap()
    }
}

/// Hands out the same [`FakePortal`] for every session.
pub struct FakePortalFactory {
    pub portal: Arc<FakePortal>,
    created: AtomicUsize,
}

impl FakePortalFactory {
    pub fn new(portal: Arc<FakePortal>) -> Arc<Self> {
        Arc::new(Self {
            portal,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl PortalFactory for FakePortalFactory {
    fn create(&self) -> Result<Arc<dyn Portal>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.portal.clone())
    }
}

#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    fail_containing: Mutex<Option<String>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(reference).cloned()
    }

    /// Fail every put whose path contains `needle`.
    pub fn fail_paths_containing(&self, needle: &str) {
        *self.fail_containing.lock().unwrap() = Some(needle.to_string());
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn put(&self, bytes: &[u8], suggested_path: &str) -> Result<String> {
        if let Some(needle) = self.fail_containing.lock().unwrap().as_deref() {
            if suggested_path.contains(needle) {
                return Err(SatchelError::Storage(format!(
                    "bucket rejected {}",
                    suggested_path
                )));
            }
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        let reference = format!("mem://{}", suggested_path);
        self.objects
            .lock()
            .unwrap()
            .insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }
}
