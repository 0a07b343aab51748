use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::Client;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use crate::app::{Result, SatchelError};
use crate::portal::{Document, Method, Portal, PortalConfig, PortalFactory};

#[derive(Debug, Default)]
struct ClientState {
    /// Username the cookie jar is logged in as
    principal: Option<String>,
    last_validated: Option<DateTime<Utc>>,
    last_url: Option<String>,
}

/// reqwest-backed portal client with its own cookie jar.
pub struct PortalClient {
    config: PortalConfig,
    base_url: Url,
    http: Mutex<Option<Client>>,
    state: Mutex<ClientState>,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let http = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            config,
            base_url,
            http: Mutex::new(Some(http)),
            state: Mutex::new(ClientState::default()),
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn http(&self) -> Result<Client> {
        self.http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SatchelError::SessionClosed(self.base_url.to_string()))
    }

    /// Wait out the courtesy delay since this client's previous request.
    async fn pace(&self) {
        let delay = self.config.request_delay();
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Send without judging the status code.
    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<Document> {
        let http = self.http()?;
        let mut target = self.base_url.join(url)?;

        let builder = match method {
            Method::Get => {
                if !params.is_empty() {
                    target.query_pairs_mut().extend_pairs(params.iter());
                }
                http.get(target.clone())
            }
            Method::Post => {
                let body = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.iter())
                    .finish();
                http.post(target.clone())
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
            }
        };

        let referer = referer
            .map(String::from)
            .or_else(|| self.state().last_url.clone());
        let builder = match referer {
            Some(referer) => builder.header(REFERER, referer),
            None => builder,
        };

        self.pace().await;
        debug!(%method, url = %target, "portal request");

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?.to_vec();

        self.state().last_url = Some(final_url.clone());

        Ok(Document {
            url: final_url,
            status,
            content_type,
            body,
        })
    }

    fn ensure_success(method: Method, doc: &Document) -> Result<()> {
        if (200..300).contains(&doc.status) {
            Ok(())
        } else {
            Err(SatchelError::Transport(format!(
                "{} {} returned HTTP {}",
                method, doc.url, doc.status
            )))
        }
    }

    /// The portal answers an expired session with its login form (often
    /// after a redirect) or its login error page, not with an error status.
    fn ensure_authenticated(&self, doc: &Document) -> Result<()> {
        let on_login_page = self.is_login_page(&doc.url);
        let failure_marker = self
            .config
            .login_failure_marker
            .as_deref()
            .filter(|m| !m.is_empty())
            .is_some_and(|m| doc.text().contains(m));
        if !on_login_page && !failure_marker {
            return Ok(());
        }

        let principal = self.state().principal.clone();
        self.downgrade();
        warn!(url = %doc.url, "portal sent the login page, session is gone");
        Err(SatchelError::auth(
            principal.unwrap_or_else(|| "anonymous".to_string()),
            format!("session expired, {} answered with the login page", doc.url),
        ))
    }

    fn is_login_page(&self, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        std::iter::once(self.config.login_path.as_str())
            .chain(self.config.login_page_path.as_deref())
            .filter_map(|p| self.base_url.join(p).ok())
            .any(|login| login.path() == url.path())
    }

    async fn probe(&self) -> Result<bool> {
        let doc = self
            .send(Method::Get, &self.config.probe_path, &[], None)
            .await?;
        Ok((200..300).contains(&doc.status)
            && !self.is_login_page(&doc.url)
            && doc.text().contains(&self.config.authenticated_marker))
    }

    fn downgrade(&self) {
        let mut state = self.state();
        state.principal = None;
        state.last_validated = None;
    }
}

#[async_trait]
impl Portal for PortalClient {
    async fn login(&self, username: &str, password: &str) -> Result<bool> {
        let same_principal = self.state().principal.as_deref() == Some(username);
        if same_principal && self.is_authenticated().await {
            debug!(username, "already logged in, session still valid");
            return Ok(true);
        }

        if let Some(page) = &self.config.login_page_path {
            let doc = self.send(Method::Get, page, &[], None).await?;
            Self::ensure_success(Method::Get, &doc)?;
        }

        let mut fields: Vec<(&str, &str)> = vec![
            (self.config.username_field.as_str(), username),
            (self.config.password_field.as_str(), password),
        ];
        fields.extend(
            self.config
                .extra_login_fields
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        let doc = self
            .send(Method::Post, &self.config.login_path, &fields, None)
            .await?;
        if !(200..400).contains(&doc.status) {
            warn!(username, status = doc.status, "login rejected by portal");
            return Ok(false);
        }
        if let Some(marker) = self.config.login_failure_marker.as_deref() {
            if !marker.is_empty() && doc.text().contains(marker) {
                warn!(username, "portal returned its login error page");
                return Ok(false);
            }
        }

        if !self.probe().await? {
            warn!(username, "login accepted but probe page is not authenticated");
            self.downgrade();
            return Ok(false);
        }

        let mut state = self.state();
        state.principal = Some(username.to_string());
        state.last_validated = Some(Utc::now());
        info!(username, "logged in to portal");
        Ok(true)
    }

    async fn is_authenticated(&self) -> bool {
        match self.probe().await {
            Ok(true) => {
                self.state().last_validated = Some(Utc::now());
                true
            }
            Ok(false) => {
                self.downgrade();
                false
            }
            Err(e) => {
                debug!(error = %e, "liveness probe failed");
                self.downgrade();
                false
            }
        }
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<Document> {
        let doc = self.send(method, url, params, referer).await?;
        Self::ensure_success(method, &doc)?;
        self.ensure_authenticated(&doc)?;
        Ok(doc)
    }

    async fn close(&self) {
        let was_open = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if was_open {
            *self.state() = ClientState::default();
            debug!(base = %self.base_url, "portal client closed");
        }
    }

    fn last_validated(&self) -> Option<DateTime<Utc>> {
        self.state().last_validated
    }
}

/// Creates [`PortalClient`]s from one shared configuration.
pub struct HttpPortalFactory {
    config: PortalConfig,
}

impl HttpPortalFactory {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }
}

impl PortalFactory for HttpPortalFactory {
    fn create(&self) -> Result<Arc<dyn Portal>> {
        Ok(Arc::new(PortalClient::new(self.config.clone())?))
    }
}
