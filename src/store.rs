use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{BackupError, Result};

/// The opaque, narrow capability set the engine consumes from an
/// object-store backend. Real backends (S3, GCS, ...) are external
/// collaborators this crate only depends on through this trait; it
/// bundles one reference implementation (`LocalFsStore`) so the crate
/// is runnable and testable standalone.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Negative return means "not present" (an `i64` contract instead
    /// of threading an `Option` through).
    async fn file_size(&self, path: &str) -> Result<i64>;

    async fn remove(&self, paths: &[String]) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.file_size(path).await? >= 0)
    }
}

/// Filesystem-backed reference driver: every path is a relative path
/// under `root`. Writes are atomic (temp file + rename) the way every
/// other piece of persisted state in this crate is written.
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFsStore { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlockStore for LocalFsStore {
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = full.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp).await?;
            f.write_all(&data).await?;
            f.sync_all().await?;
        }
        fs::rename(&tmp, &full).await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        fs::read(&full)
            .await
            .map_err(|e| BackupError::Io(format!("read {}: {e}", full.display())))
    }

    async fn file_size(&self, path: &str) -> Result<i64> {
        let full = self.resolve(path);
        match fs::metadata(&full).await {
            Ok(meta) => Ok(meta.len() as i64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(-1),
            Err(e) => Err(BackupError::Io(format!("stat {}: {e}", full.display()))),
        }
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            let full = self.resolve(path);
            match fs::remove_file(&full).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(BackupError::Io(format!("remove {}: {e}", full.display()))),
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix);
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(BackupError::Io(format!("list {}: {e}", dir.display()))),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                out.push(name.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Resolves a store driver from a URL scheme, the way a real deployment
/// would pick S3 vs GCS vs local. Only the `file` scheme is bundled;
/// anything else is a configuration error naming the scheme, so callers
/// get a clear signal that a driver needs registering rather than a
/// silent fallback.
pub fn resolve_driver(scheme: &str, destination_root: &Path) -> Result<Arc<dyn BlockStore>> {
    match scheme {
        "file" => Ok(Arc::new(LocalFsStore::new(destination_root.to_path_buf()))),
        other => Err(BackupError::Configuration(format!(
            "unsupported store scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        store.write("a/b/c.blk", b"hello".to_vec()).await.unwrap();
        let read = store.read("a/b/c.blk").await.unwrap();
        assert_eq!(read, b"hello");
    }

    #[tokio::test]
    async fn file_size_is_negative_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        assert_eq!(store.file_size("missing").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn remove_is_idempotent_on_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        store
            .remove(&["does-not-exist".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_returns_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        store.write("p/b.blk", b"x".to_vec()).await.unwrap();
        store.write("p/a.blk", b"y".to_vec()).await.unwrap();
        let names = store.list("p").await.unwrap();
        assert_eq!(names, vec!["a.blk".to_string(), "b.blk".to_string()]);
    }

    #[test]
    fn unknown_scheme_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_driver("s3", dir.path()).unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
    }
}
