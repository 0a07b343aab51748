use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::Result;

/// How to talk to the portal: endpoints, login form, pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,

    /// Page fetched before posting credentials, to pick up session cookies
    pub login_page_path: Option<String>,

    pub login_path: String,

    /// Authenticated-only page used as the liveness probe
    pub probe_path: String,

    pub username_field: String,
    pub password_field: String,

    /// Hidden fields the login form expects alongside the credentials
    pub extra_login_fields: BTreeMap<String, String>,

    /// Text only present on pages served to a logged-in user
    pub authenticated_marker: String,

    /// Text identifying the login error page
    pub login_failure_marker: Option<String>,

    /// Minimum delay between two requests of one session, in milliseconds (default: 300)
    pub request_delay_ms: u64,

    /// Per-request timeout in seconds (default: 20)
    pub timeout_secs: u64,

    pub user_agent: String,

    /// How long a validated session is trusted without a new probe, in seconds (default: 300)
    pub session_freshness_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://portal.example.edu".to_string(),
            login_page_path: Some("/login".to_string()),
            login_path: "/login/process".to_string(),
            probe_path: "/mypage".to_string(),
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            extra_login_fields: BTreeMap::new(),
            authenticated_marker: "logout".to_string(),
            login_failure_marker: Some("login-error".to_string()),
            request_delay_ms: 300,
            timeout_secs: 20,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            session_freshness_secs: 300,
        }
    }
}

impl PortalConfig {
    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn session_freshness(&self) -> Duration {
        Duration::from_secs(self.session_freshness_secs)
    }
}
