use bytes::Bytes;
use url::Url;

use crate::archive::{ArchiveValue, pack};
use crate::error::ValueError;
use crate::kind::ValueKind;
use crate::resource::{DataUrlResource, ResourceValue};

/// Data that crosses a step boundary.
///
/// Exactly one representation is primary. The `as_*` accessors and
/// [`convert_to`](Self::convert_to) build derived views and never modify the
/// value they are called on.
#[derive(Debug, Clone)]
pub enum Value {
  String(String),
  Url(Url),
  Resource(ResourceValue),
  Archive(ArchiveValue),
  PlainObject(serde_json::Value),
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl From<Url> for Value {
  fn from(value: Url) -> Self {
    Value::Url(value)
  }
}

impl From<serde_json::Value> for Value {
  fn from(value: serde_json::Value) -> Self {
    Value::PlainObject(value)
  }
}

impl From<ResourceValue> for Value {
  fn from(value: ResourceValue) -> Self {
    Value::Resource(value)
  }
}

impl From<ArchiveValue> for Value {
  fn from(value: ArchiveValue) -> Self {
    Value::Archive(value)
  }
}

impl Value {
  pub fn kind(&self) -> ValueKind {
    match self {
      Value::String(_) => ValueKind::String,
      Value::Url(_) => ValueKind::Url,
      Value::Resource(_) => ValueKind::Resource,
      Value::Archive(_) => ValueKind::Archive,
      Value::PlainObject(_) => ValueKind::PlainObject,
    }
  }

  fn unsupported(&self, to: ValueKind) -> ValueError {
    ValueError::Conversion {
      from: self.kind(),
      to,
      message: "no conversion defined".to_string(),
    }
  }

  /// The address this value refers to, if it is URL-backed.
  pub fn url(&self) -> Option<Url> {
    match self {
      Value::Url(url) => Some(url.clone()),
      Value::Resource(resource) => resource.url(),
      Value::Archive(archive) => archive.url(),
      _ => None,
    }
  }

  pub async fn as_string(&self) -> Result<String, ValueError> {
    match self {
      Value::String(s) => Ok(s.clone()),
      Value::Url(url) => Ok(url.to_string()),
      Value::PlainObject(serde_json::Value::String(s)) => Ok(s.clone()),
      Value::PlainObject(json) => Ok(json.to_string()),
      Value::Resource(resource) => {
        let data = resource.get().await?;
        String::from_utf8(data.to_vec()).map_err(|e| ValueError::Conversion {
          from: ValueKind::Resource,
          to: ValueKind::String,
          message: e.to_string(),
        })
      }
      Value::Archive(_) => Err(self.unsupported(ValueKind::String)),
    }
  }

  pub async fn as_plain_object(&self) -> Result<serde_json::Value, ValueError> {
    match self {
      Value::String(s) => Ok(serde_json::Value::String(s.clone())),
      Value::Url(url) => Ok(serde_json::Value::String(url.to_string())),
      Value::PlainObject(json) => Ok(json.clone()),
      Value::Resource(resource) => {
        let data = resource.get().await?;
        serde_json::from_slice(&data).map_err(|e| ValueError::Conversion {
          from: ValueKind::Resource,
          to: ValueKind::PlainObject,
          message: e.to_string(),
        })
      }
      Value::Archive(_) => Err(self.unsupported(ValueKind::PlainObject)),
    }
  }

  /// Resources and archives without an address become base64 `data:` URLs.
  pub async fn as_url(&self) -> Result<Url, ValueError> {
    let parse = |s: &str| {
      Url::parse(s).map_err(|e| ValueError::Conversion {
        from: self.kind(),
        to: ValueKind::Url,
        message: e.to_string(),
      })
    };

    match self {
      Value::Url(url) => Ok(url.clone()),
      Value::String(s) => parse(s),
      Value::PlainObject(serde_json::Value::String(s)) => parse(s),
      Value::PlainObject(_) => Err(self.unsupported(ValueKind::Url)),
      Value::Resource(resource) => resource.to_url(ValueKind::Resource.mime_type()).await,
      Value::Archive(archive) => match archive.url() {
        Some(url) => Ok(url),
        None => DataUrlResource::encode(ValueKind::Archive.mime_type(), &archive.to_tar().await?),
      },
    }
  }

  pub async fn as_resource(&self) -> Result<ResourceValue, ValueError> {
    match self {
      Value::Resource(resource) => Ok(resource.clone()),
      Value::Url(url) => ResourceValue::from_url(url.clone()),
      Value::String(s) => Ok(ResourceValue::from_bytes(Bytes::from(s.clone()))),
      Value::PlainObject(json) => Ok(ResourceValue::from_bytes(Bytes::from(json.to_string()))),
      Value::Archive(archive) => match archive.url() {
        Some(url) => ResourceValue::from_url(url),
        None => Ok(ResourceValue::from_bytes(archive.to_tar().await?)),
      },
    }
  }

  pub async fn as_archive(&self) -> Result<ArchiveValue, ValueError> {
    match self {
      Value::Archive(archive) => Ok(archive.clone()),
      Value::Url(url) => ArchiveValue::from_url(url.clone()),
      Value::Resource(resource) => Ok(ArchiveValue::from_resource(resource.clone())),
      Value::String(_) | Value::PlainObject(_) => Err(self.unsupported(ValueKind::Archive)),
    }
  }

  /// A value of kind `kind` derived from this one.
  pub async fn convert_to(&self, kind: ValueKind) -> Result<Value, ValueError> {
    if kind == self.kind() {
      return Ok(self.clone());
    }
    Ok(match kind {
      ValueKind::String => Value::String(self.as_string().await?),
      ValueKind::Url => Value::Url(self.as_url().await?),
      ValueKind::Resource => Value::Resource(self.as_resource().await?),
      ValueKind::Archive => Value::Archive(self.as_archive().await?),
      ValueKind::PlainObject => Value::PlainObject(self.as_plain_object().await?),
    })
  }

  /// The body sent for this value in a multipart request, tagged by
  /// [`ValueKind::mime_type`].
  pub async fn to_wire(&self) -> Result<Bytes, ValueError> {
    match self {
      Value::String(s) => Ok(Bytes::from(s.clone())),
      Value::Url(url) => Ok(Bytes::from(url.to_string())),
      Value::PlainObject(json) => Ok(Bytes::from(json.to_string())),
      Value::Resource(resource) => resource.get().await,
      Value::Archive(archive) => pack(&archive.get().await?),
    }
  }

  /// Compare the materialized content of two values.
  pub async fn content_eq(&self, other: &Value) -> Result<bool, ValueError> {
    if self.kind() != other.kind() {
      return Ok(false);
    }
    Ok(match (self, other) {
      (Value::Archive(a), Value::Archive(b)) => a.get().await? == b.get().await?,
      (Value::Resource(a), Value::Resource(b)) => a.get().await? == b.get().await?,
      (Value::Url(a), Value::Url(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::PlainObject(a), Value::PlainObject(b)) => a == b,
      _ => false,
    })
  }
}
