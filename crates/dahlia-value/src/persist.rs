use bytes::Bytes;
use dahlia_storage::Storage;
use tracing::debug;
use url::Url;

use crate::archive::{ArchiveValue, pack};
use crate::error::ValueError;
use crate::kind::ValueKind;
use crate::resource::ResourceValue;
use crate::value::Value;

const KIND: &str = "kind";
const VALUE: &str = "value";
const URL: &str = "url";
const DATA: &str = "data";

/// Persist a value into the directory `storage`.
///
/// The directory holds `kind` plus one payload key: `value` for strings and
/// plain objects, `url` for URL-only resources and archives, `data` for
/// bytes. Values behind local files are copied into `data` so the directory
/// owns them; anything else URL-backed never has its bytes copied.
pub async fn store_value(storage: &Storage, value: &Value) -> Result<(), ValueError> {
  // Materialize before clearing: the value may be backed by this directory.
  let (key, payload) = match value {
    Value::String(s) => (VALUE, Bytes::from(s.clone())),
    Value::PlainObject(json) => (VALUE, Bytes::from(json.to_string())),
    Value::Url(url) => (URL, Bytes::from(url.to_string())),
    Value::Resource(resource) => match resource.url().filter(url_only) {
      Some(url) => (URL, Bytes::from(url.to_string())),
      None => (DATA, resource.get().await?),
    },
    Value::Archive(archive) => match archive.url().filter(url_only) {
      Some(url) => (URL, Bytes::from(url.to_string())),
      None => (DATA, pack(&archive.get().await?)?),
    },
  };

  for key in [VALUE, URL, DATA] {
    storage.delete(key).await?;
  }
  storage.write(key, payload).await?;
  storage.write(KIND, value.kind().as_str()).await?;

  debug!(path = %storage.prefix(), kind = %value.kind(), "stored value");
  Ok(())
}

/// Whether a value at `url` can be stored as its address alone.
fn url_only(url: &Url) -> bool {
  url.scheme() != "file"
}

async fn read_text(storage: &Storage, key: &str) -> Result<String, ValueError> {
  let data = storage.read(key).await?;
  String::from_utf8(data.to_vec()).map_err(|e| ValueError::Conversion {
    from: ValueKind::Resource,
    to: ValueKind::String,
    message: e.to_string(),
  })
}

async fn read_url(storage: &Storage) -> Result<Url, ValueError> {
  let text = read_text(storage, URL).await?;
  Url::parse(&text).map_err(|e| ValueError::InvalidUrl(format!("{}: {}", text, e)))
}

/// Load a value written by [`store_value`].
///
/// Resource and archive payloads stay in storage until they are read.
pub async fn load_value(storage: &Storage) -> Result<Value, ValueError> {
  let kind: ValueKind = read_text(storage, KIND).await?.parse()?;
  let has_url = storage.exists(URL).await?;

  Ok(match kind {
    ValueKind::String => Value::String(read_text(storage, VALUE).await?),
    ValueKind::PlainObject => {
      let data = storage.read(VALUE).await?;
      Value::PlainObject(serde_json::from_slice(&data).map_err(|e| {
        ValueError::Conversion {
          from: ValueKind::Resource,
          to: ValueKind::PlainObject,
          message: e.to_string(),
        }
      })?)
    }
    ValueKind::Url => Value::Url(read_url(storage).await?),
    ValueKind::Resource if has_url => {
      Value::Resource(ResourceValue::from_url(read_url(storage).await?)?)
    }
    ValueKind::Resource => Value::Resource(ResourceValue::from_storage(storage.clone(), DATA)),
    ValueKind::Archive if has_url => {
      Value::Archive(ArchiveValue::from_url(read_url(storage).await?)?)
    }
    ValueKind::Archive => {
      let data = ResourceValue::from_storage(storage.clone(), DATA);
      Value::Archive(ArchiveValue::from_resource(data))
    }
  })
}
