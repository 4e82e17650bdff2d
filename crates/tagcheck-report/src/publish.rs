//! Publishing of a run directory to durable storage.

use std::path::{Path, PathBuf};

use tagcheck_common::constants::{DEBUG_LOG_FILE, LATEST_PREFIX};
use tagcheck_common::error::{HarnessError, Result};

use crate::store::{ArtifactStore, content_type_for};

/// Uploads every file directly inside `run_dir` to
/// `{image}/{meta_tag}/{file}` and mirrors it to `{image}/latest/{file}`.
///
/// On the first failed upload, the debug log is uploaded on a best-effort
/// basis and the original failure is returned.
///
/// Returns the keys written, in upload order.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if the run directory cannot be listed or a
/// file cannot be read, and [`HarnessError::Upload`] if the store rejects
/// an object.
pub fn publish_run(
    store: &dyn ArtifactStore,
    run_dir: &Path,
    image: &str,
    meta_tag: &str,
) -> Result<Vec<String>> {
    let files = list_files(run_dir)?;
    let prefixes = [format!("{image}/{meta_tag}"), format!("{image}/{LATEST_PREFIX}")];

    let mut keys = Vec::with_capacity(files.len() * prefixes.len());
    for path in &files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping file with non-UTF-8 name");
            continue;
        };
        let bytes = std::fs::read(path).map_err(|e| HarnessError::io(path, e))?;
        let content_type = content_type_for(path);
        for prefix in &prefixes {
            let key = format!("{prefix}/{name}");
            if let Err(e) = store.put(&key, &bytes, content_type) {
                tracing::error!(key = %key, error = %e, "upload failed");
                upload_debug_log(store, run_dir, &prefixes[0]);
                return Err(e);
            }
            keys.push(key);
        }
    }

    tracing::info!(
        image,
        meta_tag,
        objects = keys.len(),
        "run published"
    );
    Ok(keys)
}

/// Regular files directly inside `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HarnessError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn upload_debug_log(store: &dyn ArtifactStore, run_dir: &Path, prefix: &str) {
    let path = run_dir.join(DEBUG_LOG_FILE);
    let key = format!("{prefix}/{DEBUG_LOG_FILE}");
    let outcome = std::fs::read(&path)
        .map_err(|e| HarnessError::io(&path, e))
        .and_then(|bytes| store.put(&key, &bytes, content_type_for(&path)));
    match outcome {
        Ok(()) => tracing::info!(key = %key, "debug log uploaded"),
        Err(e) => tracing::warn!(key = %key, error = %e, "debug log upload failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::store::DirectoryStore;

    /// Records every attempted key and rejects those matching `reject`.
    struct RecordingStore {
        reject: Option<&'static str>,
        attempts: RefCell<Vec<(String, String)>>,
    }

    impl RecordingStore {
        fn new(reject: Option<&'static str>) -> Self {
            Self {
                reject,
                attempts: RefCell::new(Vec::new()),
            }
        }
    }

    impl ArtifactStore for RecordingStore {
        fn put(&self, key: &str, _bytes: &[u8], content_type: &str) -> Result<()> {
            self.attempts
                .borrow_mut()
                .push((key.to_string(), content_type.to_string()));
            match self.reject {
                Some(suffix) if key.ends_with(suffix) => Err(HarnessError::Upload {
                    key: key.to_string(),
                    message: "access denied".into(),
                }),
                _ => Ok(()),
            }
        }
    }

    fn run_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, body) in [
            ("index.html", "<html></html>"),
            ("ci-status.yml", "CI: 'PASS'\n"),
            ("ci.log", "run started\n"),
            ("latest.png", "png"),
        ] {
            std::fs::write(dir.path().join(name), body).expect("write");
        }
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        dir
    }

    #[test]
    fn publishes_every_file_under_meta_tag_and_latest() {
        let dir = run_dir();
        let store = RecordingStore::new(None);

        let keys = publish_run(&store, dir.path(), "linuxserver/nginx", "1.0-ls1").expect("publish");

        assert_eq!(keys.len(), 8);
        assert_eq!(keys[0], "linuxserver/nginx/1.0-ls1/ci-status.yml");
        assert_eq!(keys[1], "linuxserver/nginx/latest/ci-status.yml");
        let attempts = store.attempts.borrow();
        let png = attempts
            .iter()
            .find(|(key, _)| key == "linuxserver/nginx/latest/latest.png")
            .expect("png mirrored");
        assert_eq!(png.1, "image/png");
        assert!(!attempts.iter().any(|(key, _)| key.contains("nested")));
    }

    #[test]
    fn failed_upload_tries_debug_log_then_errors() {
        let dir = run_dir();
        let store = RecordingStore::new(Some("index.html"));

        let err = publish_run(&store, dir.path(), "linuxserver/nginx", "1.0-ls1").unwrap_err();

        assert!(matches!(err, HarnessError::Upload { ref key, .. } if key.ends_with("index.html")));
        let attempts = store.attempts.borrow();
        let (last_key, last_type) = attempts.last().expect("attempts");
        assert_eq!(last_key, "linuxserver/nginx/1.0-ls1/ci.log");
        assert_eq!(last_type, "text/plain");
    }

    #[test]
    fn publishes_into_directory_store() {
        let dir = run_dir();
        let target = tempfile::tempdir().expect("tempdir");
        let store = DirectoryStore::new(target.path());

        let _ = publish_run(&store, dir.path(), "linuxserver/nginx", "1.0-ls1").expect("publish");

        assert!(target.path().join("linuxserver/nginx/1.0-ls1/index.html").is_file());
        assert!(target.path().join("linuxserver/nginx/latest/ci.log").is_file());
    }

    #[test]
    fn missing_run_directory_is_io_error() {
        let store = RecordingStore::new(None);
        let err = publish_run(&store, Path::new("/nonexistent/run"), "img", "tag").unwrap_err();
        assert!(matches!(err, HarnessError::Io { .. }));
    }
}
