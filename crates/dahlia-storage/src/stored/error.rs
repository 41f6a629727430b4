use thiserror::Error;

use crate::error::StorageError;

/// Error type for stored-object access.
#[derive(Debug, Error)]
pub enum StoredError {
  /// A named or indexed record does not exist.
  #[error("{kind} not found: {name}")]
  NotFound { kind: &'static str, name: String },

  /// A required field has never been written.
  #[error("missing required value: {0}")]
  MissingRequired(String),

  /// Attempt to clear a required field.
  #[error("cannot unset required value: {0}")]
  RequiredUnset(String),

  /// Stored bytes could not be decoded into the field's type.
  #[error("failed to decode {key}: {message}")]
  Decode { key: String, message: String },

  /// A value could not be encoded for storage.
  #[error("failed to encode {key}: {message}")]
  Encode { key: String, message: String },

  #[error(transparent)]
  Storage(#[from] StorageError),
}
