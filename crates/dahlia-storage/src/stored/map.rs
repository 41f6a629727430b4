use std::marker::PhantomData;

use super::error::StoredError;
use crate::storage::Storage;

/// A record type that lives in its own storage directory.
pub trait StoredObject: Sized {
  /// Kind name used in not-found errors.
  const KIND: &'static str;

  /// Bind a view to an existing record directory.
  fn open(storage: Storage) -> Self;
}

/// Named records, one per immediate child directory.
pub struct StoredNamedObjectMap<T> {
  storage: Storage,
  _marker: PhantomData<fn() -> T>,
}

impl<T: StoredObject> StoredNamedObjectMap<T> {
  pub fn new(storage: Storage) -> Self {
    Self {
      storage,
      _marker: PhantomData,
    }
  }

  pub async fn contains(&self, name: &str) -> Result<bool, StoredError> {
    Ok(self.storage.is_dir(name).await?)
  }

  /// The record called `name`, which must exist.
  pub async fn get(&self, name: &str) -> Result<T, StoredError> {
    if name.is_empty() || !self.contains(name).await? {
      return Err(StoredError::NotFound {
        kind: T::KIND,
        name: name.to_string(),
      });
    }
    Ok(T::open(self.storage.substorage(name)))
  }

  /// Create an empty record directory and return a view of it.
  pub async fn create(&self, name: &str) -> Result<T, StoredError> {
    self.storage.make_dirs(name).await?;
    Ok(T::open(self.storage.substorage(name)))
  }

  pub async fn get_or_create(&self, name: &str) -> Result<T, StoredError> {
    if self.contains(name).await? {
      Ok(T::open(self.storage.substorage(name)))
    } else {
      self.create(name).await
    }
  }

  pub async fn names(&self) -> Result<Vec<String>, StoredError> {
    Ok(self.storage.list("").await?)
  }

  pub async fn all(&self) -> Result<Vec<T>, StoredError> {
    Ok(
      self
        .names()
        .await?
        .into_iter()
        .map(|name| T::open(self.storage.substorage(&name)))
        .collect(),
    )
  }

  /// Delete a record and everything under it.
  pub async fn remove(&self, name: &str) -> Result<(), StoredError> {
    if name.is_empty() {
      return Err(StoredError::NotFound {
        kind: T::KIND,
        name: name.to_string(),
      });
    }
    self.storage.delete(name).await?;
    Ok(())
  }
}
