use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::error::StorageError;

/// A boxed stream of bytes read from storage.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage backend trait.
///
/// Paths are `/`-separated and relative to the backend root; the empty path
/// is the root itself. Directories are implicit parents of files but may also
/// exist on their own (an empty record).
///
/// Deleting a path that does not exist is not an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
  /// Open a file for streaming reads.
  async fn open(&self, path: &str) -> Result<ByteStream, StorageError>;

  /// Read a whole file into memory.
  async fn read(&self, path: &str) -> Result<Bytes, StorageError> {
    let mut stream = self.open(path).await?;
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
      buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
  }

  /// Replace the content of a file, creating parent directories as needed.
  async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError>;

  /// Whether a file or directory exists at `path`.
  async fn exists(&self, path: &str) -> Result<bool, StorageError>;

  /// Whether `path` is a directory.
  async fn is_dir(&self, path: &str) -> Result<bool, StorageError>;

  /// Create a directory and all of its parents.
  async fn make_dirs(&self, path: &str) -> Result<(), StorageError>;

  /// Delete a file or a whole directory tree.
  async fn delete(&self, path: &str) -> Result<(), StorageError>;

  /// Names of the immediate children of a directory, sorted.
  ///
  /// A missing directory lists as empty.
  async fn list(&self, path: &str) -> Result<Vec<String>, StorageError>;

  /// Move a file or directory tree.
  async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

  /// Copy a file or directory tree.
  async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError>;

  /// Human-readable location of the backend root, for logs.
  fn location(&self) -> String;
}
