use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::backend::{ByteStream, StorageBackend};
use crate::error::StorageError;
use crate::path::validate;

/// Prefix of in-flight temporary files; never listed.
const TEMP_PREFIX: &str = ".dahlia-tmp-";

/// Filesystem-based storage backend.
///
/// Each key is stored at `{root}/{key}`. Writes go to a temporary sibling
/// file that is renamed into place, so a reader (or a restarted process)
/// only ever sees the old or the new content of a field.
pub struct FsBackend {
  root: PathBuf,
}

impl FsBackend {
  /// Create a new filesystem backend rooted at the given path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Root directory of the backend.
  pub fn root(&self) -> &Path {
    &self.root
  }

  fn key_to_path(&self, key: &str) -> Result<PathBuf, StorageError> {
    validate(key)?;
    let mut path = self.root.clone();
    for segment in key.split('/').filter(|s| !s.is_empty()) {
      path.push(segment);
    }
    Ok(path)
  }
}

fn not_found(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
  move |e| {
    if e.kind() == ErrorKind::NotFound {
      StorageError::NotFound(key.to_string())
    } else {
      StorageError::Io(e)
    }
  }
}

#[async_trait]
impl StorageBackend for FsBackend {
  async fn open(&self, path: &str) -> Result<ByteStream, StorageError> {
    let file_path = self.key_to_path(path)?;
    let file = File::open(&file_path).await.map_err(not_found(path))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(StorageError::Io));
    Ok(Box::pin(stream))
  }

  async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
    let file_path = self.key_to_path(path)?;
    let parent = file_path
      .parent()
      .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
    fs::create_dir_all(parent).await?;

    let temp_path = parent.join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()));
    let mut file = File::create(&temp_path).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, &file_path).await?;
    Ok(())
  }

  async fn exists(&self, path: &str) -> Result<bool, StorageError> {
    let file_path = self.key_to_path(path)?;
    Ok(fs::try_exists(&file_path).await?)
  }

  async fn is_dir(&self, path: &str) -> Result<bool, StorageError> {
    let file_path = self.key_to_path(path)?;
    match fs::metadata(&file_path).await {
      Ok(metadata) => Ok(metadata.is_dir()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
      Err(e) => Err(StorageError::Io(e)),
    }
  }

  async fn make_dirs(&self, path: &str) -> Result<(), StorageError> {
    let file_path = self.key_to_path(path)?;
    fs::create_dir_all(&file_path).await?;
    Ok(())
  }

  async fn delete(&self, path: &str) -> Result<(), StorageError> {
    let file_path = self.key_to_path(path)?;
    let metadata = match fs::metadata(&file_path).await {
      Ok(metadata) => metadata,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(StorageError::Io(e)),
    };

    if metadata.is_dir() {
      fs::remove_dir_all(&file_path).await?;
    } else {
      fs::remove_file(&file_path).await?;
    }
    Ok(())
  }

  async fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
    let dir_path = self.key_to_path(path)?;
    let mut entries = match fs::read_dir(&dir_path).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(StorageError::Io(e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      if let Some(name) = entry.file_name().to_str()
        && !name.starts_with(TEMP_PREFIX)
      {
        names.push(name.to_string());
      }
    }
    names.sort();
    Ok(names)
  }

  async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
    let from_path = self.key_to_path(from)?;
    let to_path = self.key_to_path(to)?;
    if let Some(parent) = to_path.parent() {
      fs::create_dir_all(parent).await?;
    }
    fs::rename(&from_path, &to_path)
      .await
      .map_err(not_found(from))
  }

  async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
    let from_path = self.key_to_path(from)?;
    let to_path = self.key_to_path(to)?;
    let metadata = fs::metadata(&from_path).await.map_err(not_found(from))?;

    if metadata.is_dir() {
      copy_dir_recursive(&from_path, &to_path).await?;
    } else {
      if let Some(parent) = to_path.parent() {
        fs::create_dir_all(parent).await?;
      }
      fs::copy(&from_path, &to_path).await?;
    }
    Ok(())
  }

  fn location(&self) -> String {
    self.root.display().to_string()
  }
}

/// Recursively copy a directory.
async fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), std::io::Error> {
  fs::create_dir_all(dest).await?;

  let mut entries = fs::read_dir(src).await?;
  while let Some(entry) = entries.next_entry().await? {
    let src_path = entry.path();
    let dest_path = dest.join(entry.file_name());

    if src_path.is_dir() {
      Box::pin(copy_dir_recursive(&src_path, &dest_path)).await?;
    } else {
      fs::copy(&src_path, &dest_path).await?;
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_write_read_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsBackend::new(dir.path());

    backend
      .write("steps/0/status", Bytes::from_static(b"pending"))
      .await
      .unwrap();
    backend
      .write("steps/1/status", Bytes::from_static(b"completed"))
      .await
      .unwrap();

    assert_eq!(
      backend.read("steps/1/status").await.unwrap(),
      Bytes::from_static(b"completed")
    );
    assert_eq!(backend.list("steps").await.unwrap(), vec!["0", "1"]);
    assert!(backend.is_dir("steps/0").await.unwrap());
    assert!(!backend.is_dir("steps/0/status").await.unwrap());
  }

  #[tokio::test]
  async fn test_overwrite_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsBackend::new(dir.path());

    backend.write("status", Bytes::from_static(b"a")).await.unwrap();
    backend.write("status", Bytes::from_static(b"b")).await.unwrap();

    assert_eq!(backend.list("").await.unwrap(), vec!["status"]);
    assert_eq!(
      backend.read("status").await.unwrap(),
      Bytes::from_static(b"b")
    );
  }

  #[tokio::test]
  async fn test_missing_key_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsBackend::new(dir.path());

    assert!(matches!(
      backend.read("nope").await,
      Err(StorageError::NotFound(_))
    ));
    assert!(backend.list("nope").await.unwrap().is_empty());
    backend.delete("nope").await.unwrap();
  }

  #[tokio::test]
  async fn test_copy_and_rename_directories() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsBackend::new(dir.path());

    backend
      .write("a/inner/file", Bytes::from_static(b"x"))
      .await
      .unwrap();
    backend.copy("a", "b").await.unwrap();
    backend.rename("a", "c").await.unwrap();

    assert!(!backend.exists("a").await.unwrap());
    assert_eq!(
      backend.read("b/inner/file").await.unwrap(),
      Bytes::from_static(b"x")
    );
    assert_eq!(
      backend.read("c/inner/file").await.unwrap(),
      Bytes::from_static(b"x")
    );
  }
}
