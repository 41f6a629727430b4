use dahlia_storage::StorageError;
use dahlia_storage::stored::StoredError;
use thiserror::Error;

/// Error type for runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
  /// No runtime is registered for the URL's scheme.
  #[error("no runtime registered for {0}")]
  UnknownRuntime(String),

  #[error("application already exists: {0}")]
  ApplicationExists(String),

  #[error("application not found: {0}")]
  ApplicationNotFound(String),

  #[error("image not available: {0}")]
  ImageNotFound(String),

  #[error("instance already exists: {0}")]
  InstanceExists(String),

  #[error("instance not found: {0}")]
  InstanceNotFound(String),

  #[error(transparent)]
  Stored(#[from] StoredError),

  #[error(transparent)]
  Storage(#[from] StorageError),
}
