use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::backend::{ByteStream, StorageBackend};
use crate::error::StorageError;
use crate::fs::FsBackend;
use crate::http::HttpBackend;
use crate::memory::MemoryBackend;
use crate::path::join;

/// A view of a storage backend narrowed to one sub-tree.
///
/// Cloning is cheap; every clone shares the backend. All paths handed to the
/// methods below are relative to this view's prefix.
#[derive(Clone)]
pub struct Storage {
  backend: Arc<dyn StorageBackend>,
  prefix: String,
}

impl Storage {
  /// Wrap a backend, rooted at its top level.
  pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
    Self {
      backend,
      prefix: String::new(),
    }
  }

  /// A fresh in-memory storage.
  pub fn memory() -> Self {
    Self::new(Arc::new(MemoryBackend::new()))
  }

  /// Storage rooted at a local directory.
  pub fn filesystem(root: impl Into<PathBuf>) -> Self {
    Self::new(Arc::new(FsBackend::new(root)))
  }

  /// Open storage from a location string.
  ///
  /// `http://` and `https://` give a read-only mirror, `file://` URLs and
  /// bare paths give a filesystem backend, and `memory:` a fresh in-memory
  /// one.
  pub fn from_location(location: &str) -> Result<Self, StorageError> {
    debug!(%location, "opening storage");
    if location == "memory:" {
      return Ok(Self::memory());
    }

    match Url::parse(location) {
      Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
        Ok(Self::new(Arc::new(HttpBackend::new(url))))
      }
      Ok(url) if url.scheme() == "file" => {
        let path = url
          .to_file_path()
          .map_err(|_| StorageError::InvalidPath(location.to_string()))?;
        Ok(Self::filesystem(path))
      }
      _ => Ok(Self::filesystem(location)),
    }
  }

  /// A view of the sub-tree at `path`.
  pub fn substorage(&self, path: &str) -> Storage {
    Self {
      backend: self.backend.clone(),
      prefix: join(&self.prefix, path),
    }
  }

  /// The prefix of this view inside its backend.
  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  /// Last path segment of the prefix, i.e. the name of this record.
  pub fn name(&self) -> &str {
    self.prefix.rsplit('/').next().unwrap_or_default()
  }

  fn full(&self, path: &str) -> String {
    join(&self.prefix, path)
  }

  pub async fn open(&self, path: &str) -> Result<ByteStream, StorageError> {
    self.backend.open(&self.full(path)).await
  }

  pub async fn read(&self, path: &str) -> Result<Bytes, StorageError> {
    self.backend.read(&self.full(path)).await
  }

  /// Read a file, mapping a missing key to `None`.
  pub async fn read_optional(&self, path: &str) -> Result<Option<Bytes>, StorageError> {
    match self.read(path).await {
      Ok(data) => Ok(Some(data)),
      Err(StorageError::NotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }

  pub async fn write(&self, path: &str, data: impl Into<Bytes>) -> Result<(), StorageError> {
    self.backend.write(&self.full(path), data.into()).await
  }

  pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
    self.backend.exists(&self.full(path)).await
  }

  pub async fn is_dir(&self, path: &str) -> Result<bool, StorageError> {
    self.backend.is_dir(&self.full(path)).await
  }

  pub async fn make_dirs(&self, path: &str) -> Result<(), StorageError> {
    self.backend.make_dirs(&self.full(path)).await
  }

  pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
    self.backend.delete(&self.full(path)).await
  }

  pub async fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
    self.backend.list(&self.full(path)).await
  }

  pub async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
    self
      .backend
      .rename(&self.full(from), &self.full(to))
      .await
  }

  pub async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
    self.backend.copy(&self.full(from), &self.full(to)).await
  }

  /// Every file below this view, as paths relative to it.
  pub async fn entries(&self) -> Result<Vec<String>, StorageError> {
    let mut files = Vec::new();
    let mut pending = vec![String::new()];

    while let Some(dir) = pending.pop() {
      for name in self.list(&dir).await? {
        let path = join(&dir, &name);
        if self.is_dir(&path).await? {
          pending.push(path);
        } else {
          files.push(path);
        }
      }
    }

    files.sort();
    Ok(files)
  }
}

impl fmt::Debug for Storage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Storage")
      .field("backend", &self.backend.location())
      .field("prefix", &self.prefix)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_substorage_is_scoped() {
    let root = Storage::memory();
    let execution = root.substorage("executions/run-1");

    execution.write("status", "pending").await.unwrap();

    assert_eq!(execution.name(), "run-1");
    assert!(root.exists("executions/run-1/status").await.unwrap());
    assert_eq!(
      execution.substorage("").read("status").await.unwrap(),
      Bytes::from_static(b"pending")
    );
  }

  #[tokio::test]
  async fn test_entries_walks_recursively() {
    let root = Storage::memory();
    root.write("a/1", "x").await.unwrap();
    root.write("a/b/2", "y").await.unwrap();
    root.write("c", "z").await.unwrap();
    root.make_dirs("empty").await.unwrap();

    assert_eq!(root.entries().await.unwrap(), vec!["a/1", "a/b/2", "c"]);
  }

  #[tokio::test]
  async fn test_read_optional() {
    let root = Storage::memory();
    assert!(root.read_optional("missing").await.unwrap().is_none());
  }

  #[test]
  fn test_from_location() {
    let storage = Storage::from_location("https://mirror.local/executions/").unwrap();
    assert_eq!(
      storage.backend.location(),
      "https://mirror.local/executions/"
    );

    let storage = Storage::from_location("/var/lib/dahlia").unwrap();
    assert_eq!(storage.backend.location(), "/var/lib/dahlia");
  }
}
