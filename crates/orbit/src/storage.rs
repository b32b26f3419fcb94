//! Binary object storage for uploaded files.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Top-level folder for files attached to requests
pub const UPLOAD_PREFIX: &str = "user_upload/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored { key: String },
    Failed { reason: String },
}

impl UploadOutcome {
    pub fn key(&self) -> Option<&str> {
        match self {
            UploadOutcome::Stored { key } => Some(key),
            UploadOutcome::Failed { .. } => None,
        }
    }
}

/// Build a unique object name: `<mime major>/<base>-<YYYYmmdd_HHMMSS><ext>`, lowercased
/// with spaces replaced by underscores.
pub fn object_name(file_name: &str, mime_type: &str, now: DateTime<Utc>) -> String {
    let path = Path::new(file_name);
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let major = mime_type.split('/').next().unwrap_or_default();

    format!(
        "{}/{}-{}{}",
        major,
        base,
        now.format("%Y%m%d_%H%M%S"),
        ext
    )
    .replace(' ', "_")
    .to_lowercase()
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `key`, replacing anything already there
    async fn put_object(&self, key: &str, mime_type: &str, bytes: Bytes) -> Result<()>;

    /// Store a file and report where it went. Failures are returned, never raised.
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: &str,
        mime_type: &str,
    ) -> UploadOutcome {
        let key = format!(
            "{}{}",
            UPLOAD_PREFIX,
            object_name(file_name, mime_type, Utc::now())
        );
        match self.put_object(&key, mime_type, bytes).await {
            Ok(()) => {
                tracing::debug!(%key, "stored object");
                UploadOutcome::Stored { key }
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to store object");
                UploadOutcome::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }
}

/// Stores objects as files below a root directory
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(anyhow!("object key {} escapes the storage root", key));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, key: &str, _mime_type: &str, bytes: Bytes) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Keeps objects in memory, for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (String, Bytes)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes and MIME type for `key`
    pub fn get(&self, key: &str) -> Option<(String, Bytes)> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &str, mime_type: &str, bytes: Bytes) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("object store lock poisoned"))?;
        objects.insert(key.to_string(), (mime_type.to_string(), bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 5, 7).unwrap()
    }

    #[test]
    fn test_object_name_format() {
        assert_eq!(
            object_name("My Photo.PNG", "image/png", noon()),
            "image/my_photo-20240309_120507.png"
        );
        assert_eq!(
            object_name("notes", "text/plain", noon()),
            "text/notes-20240309_120507"
        );
        assert_eq!(
            object_name("dir/archive.tar.gz", "application/gzip", noon()),
            "application/archive.tar-20240309_120507.gz"
        );
    }

    #[tokio::test]
    async fn test_fs_store_writes_under_prefix() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let outcome = store
            .upload(Bytes::from_static(b"hello"), "a.txt", "text/plain")
            .await;

        let key = outcome.key().expect("stored").to_string();
        assert!(key.starts_with("user_upload/text/a-"));
        assert!(key.ends_with(".txt"));
        let written = std::fs::read(dir.path().join(&key)).unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn test_fs_store_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let outcome = store
            .upload(Bytes::from_static(b"x"), "evil.txt", "../../etc")
            .await;
        assert!(matches!(outcome, UploadOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryObjectStore::new();
        let outcome = store
            .upload(Bytes::from_static(b"img"), "cat.jpg", "image/jpeg")
            .await;

        let key = outcome.key().unwrap();
        assert!(key.starts_with("user_upload/image/cat-"));
        assert_eq!(
            store.get(key),
            Some(("image/jpeg".to_string(), Bytes::from_static(b"img")))
        );
        assert_eq!(store.keys(), vec![key.to_string()]);
    }
}
