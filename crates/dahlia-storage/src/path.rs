use crate::error::StorageError;

/// Join two storage paths, dropping empty segments.
pub fn join(base: &str, path: &str) -> String {
  base
    .split('/')
    .chain(path.split('/'))
    .filter(|segment| !segment.is_empty())
    .collect::<Vec<_>>()
    .join("/")
}

/// Reject paths that could escape the storage root.
pub(crate) fn validate(path: &str) -> Result<(), StorageError> {
  if path
    .split('/')
    .any(|segment| segment == ".." || segment == ".")
  {
    return Err(StorageError::InvalidPath(path.to_string()));
  }
  Ok(())
}

/// The parent of a path, or `None` for top-level entries.
pub(crate) fn parent(path: &str) -> Option<&str> {
  path.rfind('/').map(|idx| &path[..idx])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_join_skips_empty_segments() {
    assert_eq!(join("", "steps"), "steps");
    assert_eq!(join("executions/run-1/", "/steps/0"), "executions/run-1/steps/0");
    assert_eq!(join("a", ""), "a");
  }

  #[test]
  fn test_validate_rejects_parent_segments() {
    assert!(validate("steps/0/status").is_ok());
    assert!(matches!(
      validate("steps/../../etc"),
      Err(StorageError::InvalidPath(_))
    ));
  }

  #[test]
  fn test_parent() {
    assert_eq!(parent("a/b/c"), Some("a/b"));
    assert_eq!(parent("a"), None);
  }
}
