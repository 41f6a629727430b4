use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::backend::{ByteStream, StorageBackend};
use crate::error::StorageError;
use crate::path::{parent, validate};

#[derive(Debug, Default)]
struct Tree {
  files: BTreeMap<String, Bytes>,
  dirs: BTreeSet<String>,
}

impl Tree {
  fn add_parents(&mut self, path: &str) {
    let mut current = parent(path);
    while let Some(dir) = current {
      self.dirs.insert(dir.to_string());
      current = parent(dir);
    }
  }

  /// Every key (file or directory) at or below `path`.
  fn subtree(&self, path: &str) -> (Vec<String>, Vec<String>) {
    let prefix = format!("{}/", path);
    let files = self
      .files
      .keys()
      .filter(|k| path.is_empty() || *k == path || k.starts_with(&prefix))
      .cloned()
      .collect();
    let dirs = self
      .dirs
      .iter()
      .filter(|k| path.is_empty() || *k == path || k.starts_with(&prefix))
      .cloned()
      .collect();
    (files, dirs)
  }
}

fn rebase(key: &str, from: &str, to: &str) -> String {
  format!("{}{}", to, &key[from.len()..])
}

/// In-memory storage backend.
///
/// Suitable for tests and for executions that do not need to outlive the
/// process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
  tree: RwLock<Tree>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
  async fn open(&self, path: &str) -> Result<ByteStream, StorageError> {
    let data = self.read(path).await?;
    Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
  }

  async fn read(&self, path: &str) -> Result<Bytes, StorageError> {
    validate(path)?;
    let tree = self.tree.read().await;
    tree
      .files
      .get(path)
      .cloned()
      .ok_or_else(|| StorageError::NotFound(path.to_string()))
  }

  async fn write(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
    validate(path)?;
    if path.is_empty() {
      return Err(StorageError::InvalidPath(path.to_string()));
    }
    let mut tree = self.tree.write().await;
    tree.add_parents(path);
    tree.files.insert(path.to_string(), data);
    Ok(())
  }

  async fn exists(&self, path: &str) -> Result<bool, StorageError> {
    validate(path)?;
    let tree = self.tree.read().await;
    Ok(path.is_empty() || tree.files.contains_key(path) || tree.dirs.contains(path))
  }

  async fn is_dir(&self, path: &str) -> Result<bool, StorageError> {
    validate(path)?;
    let tree = self.tree.read().await;
    Ok(path.is_empty() || tree.dirs.contains(path))
  }

  async fn make_dirs(&self, path: &str) -> Result<(), StorageError> {
    validate(path)?;
    if path.is_empty() {
      return Ok(());
    }
    let mut tree = self.tree.write().await;
    tree.add_parents(path);
    tree.dirs.insert(path.to_string());
    Ok(())
  }

  async fn delete(&self, path: &str) -> Result<(), StorageError> {
    validate(path)?;
    let mut tree = self.tree.write().await;
    let (files, dirs) = tree.subtree(path);
    for key in files {
      tree.files.remove(&key);
    }
    for key in dirs {
      tree.dirs.remove(&key);
    }
    Ok(())
  }

  async fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
    validate(path)?;
    let tree = self.tree.read().await;
    let prefix = if path.is_empty() {
      String::new()
    } else {
      format!("{}/", path)
    };

    let children: BTreeSet<String> = tree
      .files
      .keys()
      .chain(tree.dirs.iter())
      .filter_map(|key| key.strip_prefix(&prefix))
      .filter_map(|rest| rest.split('/').next())
      .filter(|name| !name.is_empty())
      .map(str::to_string)
      .collect();

    Ok(children.into_iter().collect())
  }

  async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
    validate(from)?;
    validate(to)?;
    if from.is_empty() || to.is_empty() {
      return Err(StorageError::InvalidPath(from.to_string()));
    }
    let mut tree = self.tree.write().await;
    let (files, dirs) = tree.subtree(from);
    if files.is_empty() && dirs.is_empty() {
      return Err(StorageError::NotFound(from.to_string()));
    }

    for key in files {
      if let Some(data) = tree.files.remove(&key) {
        let target = rebase(&key, from, to);
        tree.add_parents(&target);
        tree.files.insert(target, data);
      }
    }
    for key in dirs {
      tree.dirs.remove(&key);
      let target = rebase(&key, from, to);
      tree.add_parents(&target);
      tree.dirs.insert(target);
    }
    Ok(())
  }

  async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
    validate(from)?;
    validate(to)?;
    if from.is_empty() || to.is_empty() {
      return Err(StorageError::InvalidPath(from.to_string()));
    }
    let mut tree = self.tree.write().await;
    let (files, dirs) = tree.subtree(from);
    if files.is_empty() && dirs.is_empty() {
      return Err(StorageError::NotFound(from.to_string()));
    }

    for key in files {
      if let Some(data) = tree.files.get(&key).cloned() {
        let target = rebase(&key, from, to);
        tree.add_parents(&target);
        tree.files.insert(target, data);
      }
    }
    for key in dirs {
      let target = rebase(&key, from, to);
      tree.add_parents(&target);
      tree.dirs.insert(target);
    }
    Ok(())
  }

  fn location(&self) -> String {
    "memory:".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_in_memory_backend() {
    let backend = MemoryBackend::new();

    assert!(matches!(
      backend.read("key").await,
      Err(StorageError::NotFound(_))
    ));

    backend
      .write("workers/import/status", Bytes::from_static(b"pending"))
      .await
      .unwrap();
    backend.make_dirs("workers/export").await.unwrap();

    assert_eq!(backend.list("").await.unwrap(), vec!["workers"]);
    assert_eq!(
      backend.list("workers").await.unwrap(),
      vec!["export", "import"]
    );
    assert!(backend.is_dir("workers/import").await.unwrap());
    assert!(backend.exists("workers/import/status").await.unwrap());

    backend.delete("workers/import").await.unwrap();
    assert_eq!(backend.list("workers").await.unwrap(), vec!["export"]);
  }

  #[tokio::test]
  async fn test_rename_moves_subtree() {
    let backend = MemoryBackend::new();
    backend
      .write("a/b/c", Bytes::from_static(b"1"))
      .await
      .unwrap();

    backend.rename("a", "z").await.unwrap();

    assert!(!backend.exists("a").await.unwrap());
    assert_eq!(
      backend.read("z/b/c").await.unwrap(),
      Bytes::from_static(b"1")
    );
    assert!(backend.is_dir("z/b").await.unwrap());
  }

  #[tokio::test]
  async fn test_sibling_prefix_is_not_deleted() {
    let backend = MemoryBackend::new();
    backend.write("step/x", Bytes::from_static(b"1")).await.unwrap();
    backend.write("steps/x", Bytes::from_static(b"2")).await.unwrap();

    backend.delete("step").await.unwrap();

    assert!(backend.exists("steps/x").await.unwrap());
  }
}
