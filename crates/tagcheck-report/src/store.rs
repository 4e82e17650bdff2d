//! Durable artifact storage.
//!
//! [`ArtifactStore`] is the seam between publishing and the storage service;
//! [`DirectoryStore`] keeps the mirror on a local filesystem root.

use std::path::{Component, Path, PathBuf};

use tagcheck_common::error::{HarnessError, Result};

/// Key-addressed object storage.
pub trait ArtifactStore {
    /// Stores `bytes` under `key`, replacing any previous object.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Upload`] if the object cannot be stored.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
}

/// Content type served for a file, chosen by extension.
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("yml") => "text/yaml",
        Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// [`ArtifactStore`] writing objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File backing `key`. Keys may not escape the root.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(HarnessError::Upload {
                key: key.to_string(),
                message: "invalid storage key".into(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ArtifactStore for DirectoryStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        let upload_err = |e: std::io::Error| HarnessError::Upload {
            key: key.to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(upload_err)?;
        }
        std::fs::write(&path, bytes).map_err(upload_err)?;
        tracing::debug!(key, content_type, size = bytes.len(), "object stored");
        Ok(())
    }
}
