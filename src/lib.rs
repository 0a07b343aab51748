//! # Satchel
//!
//! Keeps a local, incrementally synchronized copy of course content
//! (notices, materials, assignments, syllabi and their attachments) from an
//! authenticated academic web portal, for many users at once.
//!
//! ## Architecture
//!
//! ```text
//! SyncTaskRegistry → SyncEngine → SessionRegistry → NavigationResolver
//!                              → ContentSynchronizer → AttachmentPipeline → Store
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the credentials
//! SATCHEL_PASSWORD=... satchel login --user 20231234
//!
//! # Pull everything new from every course
//! SATCHEL_PASSWORD=... satchel sync --user 20231234
//!
//! # Browse what is stored
//! satchel items --course CS101 --type notice
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, object storage, session registry, synchronizer, task registry.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/satchel/config.toml`.
pub mod config;

/// Portal credentials lookup.
pub mod credentials;

/// Foreground watch loop: periodic syncs plus session health checks.
pub mod daemon;

/// Core domain models.
///
/// - [`ContentItem`](domain::ContentItem): one synchronized notice, material, assignment or syllabus
/// - [`AttachmentRecord`](domain::AttachmentRecord): a stored attachment and its dedup key
/// - [`SyncTask`](domain::SyncTask): one tracked synchronization run
pub mod domain;

/// Course discovery and per-course menu resolution.
pub mod navigation;

/// HTML page parsers, one per content type plus menus and course lists.
pub mod parser;

/// HTTP client for the portal with its own cookie jar and request pacing.
///
/// - [`Portal`](portal::Portal): Async trait for portal access
/// - [`PortalClient`](portal::PortalClient): reqwest-based implementation
pub mod portal;

/// Per-user authenticated sessions.
pub mod session;

/// Object storage for attachment bytes.
pub mod storage;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// The synchronization engine and its task registry.
pub mod sync;

#[cfg(test)]
pub(crate) mod test_utils;
