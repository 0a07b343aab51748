//! Configuration management for Satchel.
//!
//! Configuration is read from `~/.config/satchel/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::navigation::NavigationConfig;
use crate::parser::ParserConfig;
use crate::portal::PortalConfig;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalConfig,
    pub navigation: NavigationConfig,
    pub parsers: ParserConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

/// Where synchronized content lands on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub objects_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("satchel");
        Self {
            database_path: data_dir.join("satchel.db"),
            objects_dir: data_dir.join("objects"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between session health sweeps (default: 600)
    pub health_check_interval_secs: u64,

    /// Finished tasks kept for status queries (default: 64)
    pub finished_task_retention: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 600,
            finished_task_retention: 64,
        }
    }
}

impl SyncConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path, creating it with defaults when missing.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/satchel/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("satchel").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Satchel Configuration
#
# Every key is optional; anything left out falls back to the value shown.
# In navigation paths, {course} is replaced with the course id.

[portal]
base_url = "https://portal.example.edu"

# Page fetched before posting credentials (picks up the session cookie)
login_page_path = "/login"
login_path = "/login/process"
username_field = "username"
password_field = "password"

# Authenticated-only page and the text proving we are logged in
probe_path = "/mypage"
authenticated_marker = "logout"

# Text that only appears on the failed-login page
login_failure_marker = "login-error"

# Courtesy delay between two requests of one session (milliseconds)
request_delay_ms = 300

# Per-request timeout (seconds)
timeout_secs = 20

# Trust a validated session this long before probing again (seconds)
session_freshness_secs = 300

[portal.extra_login_fields]
# Hidden form fields sent with the credentials, e.g.
# lang = "en"

[navigation]
courses_path = "/mypage"
room_entry_path = "/course/enter"
room_entry_method = "post"
room_entry_param = "course_id"
room_home_path = "/course/{course}/home"

[parsers]
item_id_params = ["id", "article_id", "seq", "no"]
attachment_selector = ".attachments a, a.attachment"

[parsers.menu]
link = "#course-menu a, .course-menu a"
notice_keywords = ["notice", "announcement", "공지"]
material_keywords = ["material", "resource", "자료"]
assignment_keywords = ["assignment", "homework", "과제"]
syllabus_keywords = ["syllabus", "강의계획"]

[parsers.courses]
link = ".course-list a.course-link"
id_attribute = "data-course-id"
id_params = ["course_id", "course"]

[parsers.notice]
row = "table.board-list tbody tr"
link = "td.title a"
detail_body = ".board-view .content"

[storage]
# database_path = "~/.local/share/satchel/satchel.db"
# objects_dir = "~/.local/share/satchel/objects"

[sync]
# Seconds between session health sweeps in `satchel watch`
health_check_interval_secs = 600

# Finished tasks kept for status queries
finished_task_retention = 64
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
