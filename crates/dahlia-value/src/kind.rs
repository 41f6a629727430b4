use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Discriminant of a [`Value`](crate::Value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
  String,
  Url,
  Resource,
  Archive,
  PlainObject,
}

impl ValueKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ValueKind::String => "string",
      ValueKind::Url => "url",
      ValueKind::Resource => "resource",
      ValueKind::Archive => "archive",
      ValueKind::PlainObject => "plain-object",
    }
  }

  /// MIME type that tags this kind on the wire.
  pub fn mime_type(&self) -> &'static str {
    match self {
      ValueKind::String => "text/plain",
      ValueKind::Url => "text/uri-list",
      ValueKind::Resource => "application/octet-stream",
      ValueKind::Archive => "application/x-tar",
      ValueKind::PlainObject => "application/json",
    }
  }

  pub fn from_mime_type(mime: &str) -> Option<Self> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    match essence {
      "text/plain" => Some(ValueKind::String),
      "text/uri-list" => Some(ValueKind::Url),
      "application/octet-stream" => Some(ValueKind::Resource),
      "application/x-tar" => Some(ValueKind::Archive),
      "application/json" => Some(ValueKind::PlainObject),
      _ => None,
    }
  }
}

impl fmt::Display for ValueKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ValueKind {
  type Err = ValueError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "string" => Ok(ValueKind::String),
      "url" => Ok(ValueKind::Url),
      "resource" => Ok(ValueKind::Resource),
      "archive" => Ok(ValueKind::Archive),
      "plain-object" => Ok(ValueKind::PlainObject),
      other => Err(ValueError::UnknownKind(other.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kind_names_match_serde() {
    for kind in [
      ValueKind::String,
      ValueKind::Url,
      ValueKind::Resource,
      ValueKind::Archive,
      ValueKind::PlainObject,
    ] {
      let json = serde_json::to_string(&kind).unwrap();
      assert_eq!(json, format!("\"{}\"", kind));
      assert_eq!(kind.as_str().parse::<ValueKind>().unwrap(), kind);
      assert_eq!(ValueKind::from_mime_type(kind.mime_type()), Some(kind));
    }
  }

  #[test]
  fn test_mime_parameters_are_ignored() {
    assert_eq!(
      ValueKind::from_mime_type("text/plain; charset=utf-8"),
      Some(ValueKind::String)
    );
    assert_eq!(ValueKind::from_mime_type("image/png"), None);
  }
}
