//! Filesystem blob store.
//!
//! Blobs are addressed by slash-separated keys under a fixed root, e.g.
//! `users/{user}/catalogs/{catalog}/images/{name}`. Keys are validated
//! so a hostile key can never escape the root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use mobilia_core::{BlobStore, Error, Result};

/// [`BlobStore`] backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

/// Reject keys that are empty, absolute, or contain traversal segments.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') {
        return Err(Error::InvalidInput(format!("Invalid blob key: {:?}", key)));
    }
    if key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(Error::InvalidInput(format!("Invalid blob key: {:?}", key)));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("blob {}", key)))
            }
            Err(e) => Err(Error::Blob(format!("Failed to read {}: {}", key, e))),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Blob(format!("Failed to create {}: {}", key, e)))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::Blob(format!("Failed to write {}: {}", key, e)))?;

        debug!(
            component = "store",
            key = %key,
            bytes = data.len(),
            "Blob stored"
        );
        Ok(format!("file://{}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Blob(format!("Failed to delete {}: {}", key, e))),
        }
    }
}
