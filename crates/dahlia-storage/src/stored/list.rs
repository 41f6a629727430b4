use std::collections::BTreeSet;
use std::marker::PhantomData;

use super::error::StoredError;
use super::map::StoredObject;
use crate::storage::Storage;

/// Records addressed by position `0..count`.
///
/// Each element is a child directory named after its index. Elements may
/// carry a `name` key, which [`find_by_name`](Self::find_by_name) searches.
pub struct StoredOrderedNamedObjectList<T> {
  storage: Storage,
  _marker: PhantomData<fn() -> T>,
}

impl<T: StoredObject> StoredOrderedNamedObjectList<T> {
  pub fn new(storage: Storage) -> Self {
    Self {
      storage,
      _marker: PhantomData,
    }
  }

  /// Number of contiguous elements starting at index 0.
  pub async fn count(&self) -> Result<usize, StoredError> {
    let indices: BTreeSet<usize> = self
      .storage
      .list("")
      .await?
      .iter()
      .filter_map(|name| name.parse().ok())
      .collect();

    let mut count = 0;
    while indices.contains(&count) {
      count += 1;
    }
    Ok(count)
  }

  pub async fn get(&self, index: usize) -> Result<T, StoredError> {
    if index >= self.count().await? {
      return Err(StoredError::NotFound {
        kind: T::KIND,
        name: index.to_string(),
      });
    }
    Ok(self.open(index))
  }

  fn open(&self, index: usize) -> T {
    T::open(self.storage.substorage(&index.to_string()))
  }

  /// Append an empty element, returning its index and a view of it.
  pub async fn push(&self) -> Result<(usize, T), StoredError> {
    let index = self.count().await?;
    self.storage.make_dirs(&index.to_string()).await?;
    Ok((index, self.open(index)))
  }

  pub async fn all(&self) -> Result<Vec<T>, StoredError> {
    let count = self.count().await?;
    Ok((0..count).map(|index| self.open(index)).collect())
  }

  /// Index and view of the first element whose `name` key equals `name`.
  pub async fn find_by_name(&self, name: &str) -> Result<(usize, T), StoredError> {
    let count = self.count().await?;
    for index in 0..count {
      let element = self.storage.substorage(&index.to_string());
      if let Some(stored) = element.read_optional("name").await?
        && stored.as_ref() == name.as_bytes()
      {
        return Ok((index, T::open(element)));
      }
    }
    Err(StoredError::NotFound {
      kind: T::KIND,
      name: name.to_string(),
    })
  }

  /// Drop every element at or after `len`.
  pub async fn truncate(&self, len: usize) -> Result<(), StoredError> {
    let count = self.count().await?;
    for index in (len..count).rev() {
      self.storage.delete(&index.to_string()).await?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stored::StringField;

  struct Step {
    storage: Storage,
  }

  impl StoredObject for Step {
    const KIND: &'static str = "step";

    fn open(storage: Storage) -> Self {
      Self { storage }
    }
  }

  async fn push_named(list: &StoredOrderedNamedObjectList<Step>, name: &str) {
    let (_, step) = list.push().await.unwrap();
    StringField::new(&step.storage, "name")
      .set(&name.to_string())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_ordered_list() {
    let list: StoredOrderedNamedObjectList<Step> =
      StoredOrderedNamedObjectList::new(Storage::memory().substorage("steps"));

    assert_eq!(list.count().await.unwrap(), 0);
    push_named(&list, "import").await;
    push_named(&list, "train").await;
    push_named(&list, "export").await;

    assert_eq!(list.count().await.unwrap(), 3);
    assert!(list.get(2).await.is_ok());
    assert!(matches!(
      list.get(3).await,
      Err(StoredError::NotFound { kind: "step", .. })
    ));

    let (index, _) = list.find_by_name("train").await.unwrap();
    assert_eq!(index, 1);
    assert!(list.find_by_name("deploy").await.is_err());
  }

  #[tokio::test]
  async fn test_truncate() {
    let list: StoredOrderedNamedObjectList<Step> =
      StoredOrderedNamedObjectList::new(Storage::memory());
    for name in ["a", "b", "c", "d"] {
      push_named(&list, name).await;
    }

    list.truncate(2).await.unwrap();

    assert_eq!(list.count().await.unwrap(), 2);
    assert!(list.find_by_name("c").await.is_err());
    push_named(&list, "e").await;
    assert_eq!(list.find_by_name("e").await.unwrap().0, 2);
  }
}
