use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::app::{Result, SatchelError};
use crate::storage::ObjectStorage;

/// Object storage on the local filesystem.
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference returned by `put` to its on-disk location.
    pub fn path_of(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }
}

/// Keep letters, digits and `._- `; drop `.`/`..` and empty segments.
fn sanitize(suggested: &str) -> String {
    let parts: Vec<String> = suggested
        .split(['/', '\\'])
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .map(|seg| {
            seg.chars()
                .map(|c| {
                    if c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|seg| !seg.is_empty())
        .collect();

    if parts.is_empty() {
        "unnamed".to_string()
    } else {
        parts.join("/")
    }
}

/// Temporary sibling of `target`: the whole file name plus `.partial`.
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(&self, bytes: &[u8], suggested_path: &str) -> Result<String> {
        let reference = sanitize(suggested_path);
        let target = self.root.join(&reference);
        let storage_err =
            |e: std::io::Error| SatchelError::Storage(format!("{}: {}", target.display(), e));

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }

        // Write then rename so a reader never sees a half-written file.
        let partial = partial_path(&target);
        tokio::fs::write(&partial, bytes).await.map_err(storage_err)?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(storage_err)?;

        debug!(reference = %reference, bytes = bytes.len(), "stored object");
        Ok(reference)
    }
}
