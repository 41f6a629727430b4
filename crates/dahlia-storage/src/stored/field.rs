use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::StoredError;
use crate::path::join;
use crate::storage::Storage;

/// Encoding of a field value to and from the bytes of its storage key.
pub trait FieldCodec {
  type Value;

  fn encode(key: &str, value: &Self::Value) -> Result<Bytes, StoredError>;

  fn decode(key: &str, data: Bytes) -> Result<Self::Value, StoredError>;
}

/// Plain-text encoding via `Display` / `FromStr`.
pub struct TextCodec<T>(PhantomData<fn() -> T>);

impl<T> FieldCodec for TextCodec<T>
where
  T: FromStr + Display,
  T::Err: Display,
{
  type Value = T;

  fn encode(_key: &str, value: &T) -> Result<Bytes, StoredError> {
    Ok(Bytes::from(value.to_string()))
  }

  fn decode(key: &str, data: Bytes) -> Result<T, StoredError> {
    let text = std::str::from_utf8(&data).map_err(|e| StoredError::Decode {
      key: key.to_string(),
      message: e.to_string(),
    })?;
    text.trim_end().parse().map_err(|e: T::Err| StoredError::Decode {
      key: key.to_string(),
      message: e.to_string(),
    })
  }
}

/// JSON encoding via serde.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> FieldCodec for JsonCodec<T>
where
  T: Serialize + DeserializeOwned,
{
  type Value = T;

  fn encode(key: &str, value: &T) -> Result<Bytes, StoredError> {
    serde_json::to_vec(value)
      .map(Bytes::from)
      .map_err(|e| StoredError::Encode {
        key: key.to_string(),
        message: e.to_string(),
      })
  }

  fn decode(key: &str, data: Bytes) -> Result<T, StoredError> {
    serde_json::from_slice(&data).map_err(|e| StoredError::Decode {
      key: key.to_string(),
      message: e.to_string(),
    })
  }
}

/// A single typed property of a stored record.
///
/// The field is bound to one key of a storage directory. It holds no value of
/// its own; [`get`](Self::get) reads the key every time it is called.
pub struct StoredField<C> {
  storage: Storage,
  key: String,
  required: bool,
  _codec: PhantomData<fn() -> C>,
}

pub type StringField = StoredField<TextCodec<String>>;
pub type IntField = StoredField<TextCodec<i64>>;
pub type TextField<T> = StoredField<TextCodec<T>>;
pub type JsonField<T> = StoredField<JsonCodec<T>>;

impl<C: FieldCodec> StoredField<C> {
  /// An optional field.
  pub fn new(storage: &Storage, key: &str) -> Self {
    Self {
      storage: storage.clone(),
      key: key.to_string(),
      required: false,
      _codec: PhantomData,
    }
  }

  /// A field that must be present whenever it is read.
  pub fn required(storage: &Storage, key: &str) -> Self {
    Self {
      required: true,
      ..Self::new(storage, key)
    }
  }

  fn path(&self) -> String {
    join(self.storage.prefix(), &self.key)
  }

  /// Read the field.
  ///
  /// An absent optional field is `None`; an absent required field is
  /// [`StoredError::MissingRequired`].
  pub async fn get(&self) -> Result<Option<C::Value>, StoredError> {
    match self.storage.read_optional(&self.key).await? {
      Some(data) => C::decode(&self.path(), data).map(Some),
      None if self.required => Err(StoredError::MissingRequired(self.path())),
      None => Ok(None),
    }
  }

  /// Read the field, falling back to `default` when it is absent.
  ///
  /// A required field has no fallback and fails like [`get`](Self::get).
  pub async fn get_or(&self, default: C::Value) -> Result<C::Value, StoredError> {
    Ok(self.get().await?.unwrap_or(default))
  }

  /// Read the field, failing when it is absent.
  pub async fn require(&self) -> Result<C::Value, StoredError> {
    self
      .get()
      .await?
      .ok_or_else(|| StoredError::MissingRequired(self.path()))
  }

  pub async fn set(&self, value: &C::Value) -> Result<(), StoredError> {
    let data = C::encode(&self.path(), value)?;
    self.storage.write(&self.key, data).await?;
    Ok(())
  }

  /// Delete the key. Fails for required fields.
  pub async fn unset(&self) -> Result<(), StoredError> {
    if self.required {
      return Err(StoredError::RequiredUnset(self.path()));
    }
    self.storage.delete(&self.key).await?;
    Ok(())
  }

  /// Write `value`, or delete the key when `value` is `None`.
  pub async fn set_optional(&self, value: Option<&C::Value>) -> Result<(), StoredError> {
    match value {
      Some(value) => self.set(value).await,
      None => self.unset().await,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;

  #[tokio::test]
  async fn test_optional_field() {
    let storage = Storage::memory();
    let field = StringField::new(&storage, "label");

    assert_eq!(field.get().await.unwrap(), None);
    assert_eq!(field.get_or("none".into()).await.unwrap(), "none");

    field.set(&"model".to_string()).await.unwrap();
    assert_eq!(field.get().await.unwrap().as_deref(), Some("model"));

    field.unset().await.unwrap();
    assert!(!storage.exists("label").await.unwrap());
  }

  #[tokio::test]
  async fn test_required_field() {
    let storage = Storage::memory().substorage("steps/0");
    let field = IntField::required(&storage, "index");

    assert!(matches!(
      field.get().await,
      Err(StoredError::MissingRequired(key)) if key == "steps/0/index"
    ));

    assert!(matches!(
      field.get_or(0).await,
      Err(StoredError::MissingRequired(_))
    ));

    field.set(&3).await.unwrap();
    assert_eq!(field.require().await.unwrap(), 3);
    assert_eq!(field.get_or(0).await.unwrap(), 3);
    assert!(matches!(
      field.unset().await,
      Err(StoredError::RequiredUnset(_))
    ));
  }

  #[tokio::test]
  async fn test_json_field() {
    let storage = Storage::memory();
    let field: JsonField<BTreeMap<String, String>> = JsonField::new(&storage, "environment");

    let mut environment = BTreeMap::new();
    environment.insert("DATASET".to_string(), "mnist".to_string());
    field.set(&environment).await.unwrap();

    assert_eq!(field.get().await.unwrap(), Some(environment));
  }

  #[tokio::test]
  async fn test_decode_error() {
    let storage = Storage::memory();
    storage.write("count", "many").await.unwrap();

    let field = IntField::new(&storage, "count");
    assert!(matches!(
      field.get().await,
      Err(StoredError::Decode { .. })
    ));
  }

  #[tokio::test]
  async fn test_field_is_not_cached() {
    let storage = Storage::memory();
    let field = StringField::new(&storage, "status");
    field.set(&"pending".to_string()).await.unwrap();

    storage.write("status", "completed").await.unwrap();

    assert_eq!(field.get().await.unwrap().as_deref(), Some("completed"));
  }
}
