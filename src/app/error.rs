use thiserror::Error;

#[derive(Error, Debug)]
pub enum SatchelError {
    /// The portal rejected the credentials or returned its login error page.
    #[error("Authentication failed for {user}: {reason}")]
    Authentication { user: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session closed for {0}")]
    SessionClosed(String),

    #[error("Downloaded attachment is empty: {0}")]
    EmptyDownload(String),

    #[error("Sync task not found: {0}")]
    TaskNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SatchelError {
    pub fn auth(user: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            user: user.into(),
            reason: reason.into(),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Only transport failures are worth retrying at the call site.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for SatchelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("timed out: {}", e))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<rusqlite_migration::Error> for SatchelError {
    fn from(e: rusqlite_migration::Error) -> Self {
        Self::Storage(format!("migration failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, SatchelError>;
