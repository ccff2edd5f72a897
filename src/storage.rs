//! Uploaded and generated files.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file name")]
    InvalidName,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A stored file: `path` is what rows keep, `url` is what clients follow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub path: String,
    pub url: String,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, folder: &str, file_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError>;
    fn url(&self, path: &str) -> String;
}

pub struct LocalFileStore {
    root: PathBuf,
    base_url: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { root: root.into(), base_url }
    }
}

/// Keeps the last path segment, drops anything that is not a plain name and
/// prefixes a unique id so uploads never overwrite each other.
pub fn unique_name(file_name: &str) -> Result<String, StorageError> {
    let base = Path::new(file_name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .last()
        .ok_or(StorageError::InvalidName)?;
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        return Err(StorageError::InvalidName);
    }
    Ok(format!("{}_{}", Uuid::now_v7().simple(), cleaned))
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, folder: &str, file_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError> {
        let name = unique_name(file_name)?;
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), bytes).await?;
        let path = format!("{folder}/{name}");
        Ok(StoredFile { url: self.url(&path), path })
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name_strips_directories() {
        let name = unique_name("../../etc/pass wd.pdf").unwrap();
        assert!(name.ends_with("_pass_wd.pdf"));
        assert!(!name.contains('/'));
        assert!(unique_name("..").is_err());
    }

    #[tokio::test]
    async fn test_local_store_writes_under_root() {
        let root = std::env::temp_dir().join(format!("linkzur-store-{}", Uuid::now_v7()));
        let store = LocalFileStore::new(&root, "/media");
        let stored = store.put("quotations", "q.pdf", b"%PDF").await.unwrap();
        assert!(stored.path.starts_with("quotations/"));
        assert_eq!(stored.url, format!("/media/{}", stored.path));
        assert_eq!(tokio::fs::read(root.join(&stored.path)).await.unwrap(), b"%PDF");
        tokio::fs::remove_dir_all(root).await.unwrap();
    }
}
