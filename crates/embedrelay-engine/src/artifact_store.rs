//! Upstream artifact store abstraction.
//!
//! The upstream producer writes status artifacts, chunk text, and chunk
//! vectors as write-once objects. The pipeline only ever lists, reads,
//! and (after successful delivery) deletes them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Read/list/delete access to the upstream artifact container.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn ArtifactStore>`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// List raw object keys at the container root, sorted ascending.
    ///
    /// Callers filter against the artifact naming convention; the listing
    /// itself does not.
    async fn list(&self) -> Result<Vec<String>>;

    /// Fetch an object's bytes by key.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Whether an object exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed artifact store rooted at a container directory.
///
/// Keys may contain `/` separators (e.g. `chunks/doc-1/0.txt`); status
/// artifacts live at the container root so `list` only reads that level.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store over an existing container directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(Path::new(key))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("listing container {}", self.root.display()))?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading artifact {key}"))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(key)).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting artifact {key}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, body).unwrap();
        }
        let store = FsArtifactStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn list_returns_sorted_root_files() {
        let (_dir, store) = store_with(&[("b.json", "{}"), ("a.json", "{}"), ("c.txt", "x")]).await;
        let keys = store.list().await.unwrap();
        assert_eq!(keys, vec!["a.json", "b.json", "c.txt"]);
    }

    #[tokio::test]
    async fn list_skips_subdirectories() {
        let (_dir, store) = store_with(&[("a.json", "{}"), ("chunks/doc/0.txt", "hi")]).await;
        let keys = store.list().await.unwrap();
        assert_eq!(keys, vec!["a.json"]);
    }

    #[tokio::test]
    async fn get_reads_nested_keys() {
        let (_dir, store) = store_with(&[("chunks/doc/0.txt", "hello")]).await;
        let bytes = store.get("chunks/doc/0.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn get_missing_is_error() {
        let (_dir, store) = store_with(&[]).await;
        assert!(store.get("missing.json").await.is_err());
    }

    #[tokio::test]
    async fn exists_and_delete() {
        let (_dir, store) = store_with(&[("a.json", "{}")]).await;
        assert!(store.exists("a.json").await.unwrap());
        store.delete("a.json").await.unwrap();
        assert!(!store.exists("a.json").await.unwrap());
        // Deleting again is not an error.
        store.delete("a.json").await.unwrap();
    }
}
