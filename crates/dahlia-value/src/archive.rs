use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::error::ValueError;
use crate::resource::{ResourceValue, ValueStream};

/// One file of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
  /// `/`-separated path relative to the archive root.
  pub path: String,
  pub data: Bytes,
}

impl ArchiveEntry {
  pub fn new(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
    Self {
      path: path.into(),
      data: data.into(),
    }
  }
}

/// Pack entries into a tar stream.
pub fn pack(entries: &[ArchiveEntry]) -> Result<Bytes, ValueError> {
  let mut builder = tar::Builder::new(Vec::new());
  for entry in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(entry.data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, &entry.path, entry.data.as_ref())?;
  }
  Ok(Bytes::from(builder.into_inner()?))
}

/// Unpack the regular files of a tar stream, in stream order.
pub fn unpack(data: &[u8]) -> Result<Vec<ArchiveEntry>, ValueError> {
  let mut archive = tar::Archive::new(Cursor::new(data));
  let mut entries = Vec::new();
  let invalid = |e: std::io::Error| ValueError::Archive(e.to_string());

  for entry in archive.entries().map_err(invalid)? {
    let mut entry = entry.map_err(invalid)?;
    if !entry.header().entry_type().is_file() {
      continue;
    }
    let path = entry.path().map_err(invalid)?.to_string_lossy().into_owned();
    let mut buffer = Vec::new();
    entry.read_to_end(&mut buffer).map_err(invalid)?;
    entries.push(ArchiveEntry::new(path, buffer));
  }
  Ok(entries)
}

/// Where the entries of an [`ArchiveValue`] live.
#[async_trait]
pub trait ArchiveSource: Send + Sync + fmt::Debug {
  async fn entries(&self) -> Result<Vec<ArchiveEntry>, ValueError>;

  /// Stream the archive as tar bytes.
  async fn open(&self) -> Result<ValueStream, ValueError> {
    let data = pack(&self.entries().await?)?;
    Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
  }

  /// Replace the archive's content.
  async fn write_entries(&self, _entries: Vec<ArchiveEntry>) -> Result<(), ValueError> {
    Err(ValueError::ReadOnly)
  }

  fn url(&self) -> Option<Url> {
    None
  }
}

/// Entries held in memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
  entries: RwLock<Vec<ArchiveEntry>>,
}

impl MemoryArchive {
  pub fn new(entries: Vec<ArchiveEntry>) -> Self {
    Self {
      entries: RwLock::new(entries),
    }
  }
}

#[async_trait]
impl ArchiveSource for MemoryArchive {
  async fn entries(&self) -> Result<Vec<ArchiveEntry>, ValueError> {
    Ok(self.entries.read().await.clone())
  }

  async fn write_entries(&self, entries: Vec<ArchiveEntry>) -> Result<(), ValueError> {
    *self.entries.write().await = entries;
    Ok(())
  }
}

/// A local directory tree.
#[derive(Debug)]
pub struct DirectoryArchive {
  root: PathBuf,
}

impl DirectoryArchive {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

async fn collect_files(
  root: &Path,
  relative: String,
  entries: &mut Vec<ArchiveEntry>,
) -> Result<(), ValueError> {
  let mut dir = tokio::fs::read_dir(root.join(&relative)).await?;
  let mut names = Vec::new();
  while let Some(entry) = dir.next_entry().await? {
    names.push((
      entry.file_name().to_string_lossy().into_owned(),
      entry.file_type().await?.is_dir(),
    ));
  }
  names.sort();

  for (name, is_dir) in names {
    let path = if relative.is_empty() {
      name
    } else {
      format!("{}/{}", relative, name)
    };
    if is_dir {
      Box::pin(collect_files(root, path, entries)).await?;
    } else {
      let data = tokio::fs::read(root.join(&path)).await?;
      entries.push(ArchiveEntry::new(path, data));
    }
  }
  Ok(())
}

#[async_trait]
impl ArchiveSource for DirectoryArchive {
  async fn entries(&self) -> Result<Vec<ArchiveEntry>, ValueError> {
    let mut entries = Vec::new();
    collect_files(&self.root, String::new(), &mut entries).await?;
    Ok(entries)
  }

  async fn write_entries(&self, entries: Vec<ArchiveEntry>) -> Result<(), ValueError> {
    for entry in entries {
      if entry
        .path
        .split('/')
        .any(|segment| segment == ".." || segment.is_empty())
      {
        return Err(ValueError::Archive(format!("unsafe entry path: {}", entry.path)));
      }
      let path = self.root.join(&entry.path);
      if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
      tokio::fs::write(&path, &entry.data).await?;
    }
    Ok(())
  }

  fn url(&self) -> Option<Url> {
    std::path::absolute(&self.root)
      .ok()
      .and_then(|path| Url::from_directory_path(path).ok())
  }
}

/// Tar bytes carried by a resource.
#[derive(Debug)]
pub struct TarArchive {
  resource: ResourceValue,
}

impl TarArchive {
  pub fn new(resource: ResourceValue) -> Self {
    Self { resource }
  }
}

#[async_trait]
impl ArchiveSource for TarArchive {
  async fn entries(&self) -> Result<Vec<ArchiveEntry>, ValueError> {
    unpack(&self.resource.get().await?)
  }

  async fn open(&self) -> Result<ValueStream, ValueError> {
    self.resource.open().await
  }

  async fn write_entries(&self, entries: Vec<ArchiveEntry>) -> Result<(), ValueError> {
    let data = pack(&entries)?;
    self
      .resource
      .copy_from(&ResourceValue::from_bytes(data))
      .await
  }

  fn url(&self) -> Option<Url> {
    self.resource.url()
  }
}

/// An ordered bundle of named files, fetched lazily and memoized.
#[derive(Clone)]
pub struct ArchiveValue {
  source: Arc<dyn ArchiveSource>,
  cache: Arc<Mutex<Option<Vec<ArchiveEntry>>>>,
}

impl ArchiveValue {
  pub fn from_source(source: Arc<dyn ArchiveSource>) -> Self {
    Self {
      source,
      cache: Arc::new(Mutex::new(None)),
    }
  }

  pub fn from_entries(entries: Vec<ArchiveEntry>) -> Self {
    Self::from_source(Arc::new(MemoryArchive::new(entries)))
  }

  pub fn from_directory(root: impl Into<PathBuf>) -> Self {
    Self::from_source(Arc::new(DirectoryArchive::new(root)))
  }

  /// An archive whose tar bytes are carried by `resource`.
  pub fn from_resource(resource: ResourceValue) -> Self {
    Self::from_source(Arc::new(TarArchive::new(resource)))
  }

  /// A tar archive addressed by URL; nothing is fetched here.
  pub fn from_url(url: Url) -> Result<Self, ValueError> {
    Ok(Self::from_resource(ResourceValue::from_url(url)?))
  }

  /// All entries, fetched at most once.
  pub async fn get(&self) -> Result<Vec<ArchiveEntry>, ValueError> {
    let mut cache = self.cache.lock().await;
    if let Some(entries) = cache.as_ref() {
      return Ok(entries.clone());
    }
    let entries = self.source.entries().await?;
    *cache = Some(entries.clone());
    Ok(entries)
  }

  /// Stream the archive as tar bytes.
  pub async fn open(&self) -> Result<ValueStream, ValueError> {
    if let Some(entries) = self.cache.lock().await.as_ref() {
      let data = pack(entries)?;
      return Ok(Box::pin(futures::stream::once(async move { Ok(data) })));
    }
    self.source.open().await
  }

  /// The archive as tar bytes.
  pub async fn to_tar(&self) -> Result<Bytes, ValueError> {
    pack(&self.get().await?)
  }

  pub fn url(&self) -> Option<Url> {
    self.source.url()
  }

  /// Replace this archive's entries with those of `other`.
  pub async fn copy_from(&self, other: &ArchiveValue) -> Result<(), ValueError> {
    let entries = other.get().await?;
    self.source.write_entries(entries.clone()).await?;
    *self.cache.lock().await = Some(entries);
    Ok(())
  }

  /// Write every entry below `dir`.
  pub async fn extract_to(&self, dir: impl Into<PathBuf>) -> Result<(), ValueError> {
    ArchiveValue::from_directory(dir).copy_from(self).await
  }
}

impl fmt::Debug for ArchiveValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ArchiveValue")
      .field("source", &self.source)
      .finish()
  }
}
