use thiserror::Error;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
  /// The requested key does not exist.
  #[error("not found: {0}")]
  NotFound(String),

  /// The backend does not accept writes.
  #[error("storage is read-only: {0}")]
  ReadOnly(String),

  /// The path escapes the storage root or is otherwise malformed.
  #[error("invalid path: {0}")]
  InvalidPath(String),

  /// An HTTP mirror answered with an unexpected status.
  #[error("unexpected status {status} from {url}")]
  Http { status: u16, url: String },

  /// The HTTP transport itself failed.
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A directory listing could not be decoded.
  #[error("invalid listing for {path}: {message}")]
  InvalidListing { path: String, message: String },
}
