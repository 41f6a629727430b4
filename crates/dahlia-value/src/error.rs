use dahlia_storage::StorageError;
use thiserror::Error;

use crate::kind::ValueKind;

/// Error type for value access and coercion.
#[derive(Debug, Error)]
pub enum ValueError {
  /// A URL-backed read did not answer 200.
  #[error("unexpected status {status} reading {url}")]
  Transport { status: u16, url: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error("invalid url: {0}")]
  InvalidUrl(String),

  /// No resource backend handles this URL scheme.
  #[error("unsupported url scheme: {0}")]
  UnsupportedScheme(String),

  #[error("malformed data url: {0}")]
  InvalidDataUrl(String),

  #[error("cannot convert {from} to {to}: {message}")]
  Conversion {
    from: ValueKind,
    to: ValueKind,
    message: String,
  },

  #[error("unknown value kind: {0}")]
  UnknownKind(String),

  /// The backing store of this value does not accept writes.
  #[error("value is read-only")]
  ReadOnly,

  #[error("invalid archive: {0}")]
  Archive(String),
}
