use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use dahlia_storage::Storage;
use futures::{Stream, StreamExt};
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use tokio::sync::{Mutex, RwLock};
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use crate::error::ValueError;

/// A boxed stream of value bytes.
pub type ValueStream = Pin<Box<dyn Stream<Item = Result<Bytes, ValueError>> + Send>>;

fn once(data: Bytes) -> ValueStream {
  Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Where the bytes of a [`ResourceValue`] live.
#[async_trait]
pub trait ResourceSource: Send + Sync + fmt::Debug {
  async fn open(&self) -> Result<ValueStream, ValueError>;

  async fn read(&self) -> Result<Bytes, ValueError> {
    let mut stream = self.open().await?;
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
      buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
  }

  /// Replace the stored bytes.
  async fn write(&self, _data: Bytes) -> Result<(), ValueError> {
    Err(ValueError::ReadOnly)
  }

  /// The address of the bytes, when they have one.
  fn url(&self) -> Option<Url> {
    None
  }
}

/// Bytes held in memory.
#[derive(Debug, Default)]
pub struct MemoryResource {
  data: RwLock<Bytes>,
}

impl MemoryResource {
  pub fn new(data: Bytes) -> Self {
    Self {
      data: RwLock::new(data),
    }
  }
}

#[async_trait]
impl ResourceSource for MemoryResource {
  async fn open(&self) -> Result<ValueStream, ValueError> {
    Ok(once(self.data.read().await.clone()))
  }

  async fn write(&self, data: Bytes) -> Result<(), ValueError> {
    *self.data.write().await = data;
    Ok(())
  }
}

/// A local file.
#[derive(Debug)]
pub struct FileResource {
  path: PathBuf,
}

impl FileResource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl ResourceSource for FileResource {
  async fn open(&self) -> Result<ValueStream, ValueError> {
    let file = tokio::fs::File::open(&self.path).await?;
    Ok(Box::pin(
      ReaderStream::new(file).map(|r| r.map_err(ValueError::Io)),
    ))
  }

  async fn write(&self, data: Bytes) -> Result<(), ValueError> {
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&self.path, &data).await?;
    Ok(())
  }

  fn url(&self) -> Option<Url> {
    std::path::absolute(&self.path)
      .ok()
      .and_then(|path| Url::from_file_path(path).ok())
  }
}

/// A remote resource fetched with `GET`.
#[derive(Debug)]
pub struct HttpResource {
  url: Url,
  client: reqwest::Client,
}

impl HttpResource {
  pub fn new(url: Url) -> Self {
    Self {
      url,
      client: reqwest::Client::new(),
    }
  }
}

#[async_trait]
impl ResourceSource for HttpResource {
  async fn open(&self) -> Result<ValueStream, ValueError> {
    debug!(url = %self.url, "fetching resource");
    let response = self.client.get(self.url.clone()).send().await?;
    if response.status() != StatusCode::OK {
      return Err(ValueError::Transport {
        status: response.status().as_u16(),
        url: self.url.to_string(),
      });
    }
    Ok(Box::pin(
      response.bytes_stream().map(|r| r.map_err(ValueError::Http)),
    ))
  }

  fn url(&self) -> Option<Url> {
    Some(self.url.clone())
  }
}

/// Bytes inlined in a `data:` URL.
#[derive(Debug)]
pub struct DataUrlResource {
  url: Url,
}

impl DataUrlResource {
  pub fn new(url: Url) -> Self {
    Self { url }
  }

  /// Build a base64 `data:` URL for `data`.
  pub fn encode(mime_type: &str, data: &[u8]) -> Result<Url, ValueError> {
    let text = format!("data:{};base64,{}", mime_type, STANDARD.encode(data));
    Url::parse(&text).map_err(|e| ValueError::InvalidUrl(e.to_string()))
  }

  fn decode(&self) -> Result<Bytes, ValueError> {
    let invalid = || ValueError::InvalidDataUrl(self.url.to_string());
    let rest = self.url.as_str().strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;

    if header.split(';').any(|param| param == "base64") {
      STANDARD
        .decode(payload)
        .map(Bytes::from)
        .map_err(|_| invalid())
    } else {
      Ok(Bytes::from(percent_decode_str(payload).collect::<Vec<u8>>()))
    }
  }
}

#[async_trait]
impl ResourceSource for DataUrlResource {
  async fn open(&self) -> Result<ValueStream, ValueError> {
    Ok(once(self.decode()?))
  }

  fn url(&self) -> Option<Url> {
    Some(self.url.clone())
  }
}

/// A key inside a [`Storage`] tree.
#[derive(Debug)]
pub struct StorageResource {
  storage: Storage,
  key: String,
}

impl StorageResource {
  pub fn new(storage: Storage, key: &str) -> Self {
    Self {
      storage,
      key: key.to_string(),
    }
  }
}

#[async_trait]
impl ResourceSource for StorageResource {
  async fn open(&self) -> Result<ValueStream, ValueError> {
    let stream = self.storage.open(&self.key).await?;
    Ok(Box::pin(stream.map(|r| r.map_err(ValueError::Storage))))
  }

  async fn write(&self, data: Bytes) -> Result<(), ValueError> {
    self.storage.write(&self.key, data).await?;
    Ok(())
  }
}

/// A binary blob, fetched lazily and memoized.
///
/// Nothing is read from the source until [`get`](Self::get) or
/// [`open`](Self::open). The first `get` caches the bytes for the lifetime
/// of this value and its clones; the cache is never re-validated.
#[derive(Clone)]
pub struct ResourceValue {
  source: Arc<dyn ResourceSource>,
  cache: Arc<Mutex<Option<Bytes>>>,
}

impl ResourceValue {
  pub fn from_source(source: Arc<dyn ResourceSource>) -> Self {
    Self {
      source,
      cache: Arc::new(Mutex::new(None)),
    }
  }

  pub fn from_bytes(data: impl Into<Bytes>) -> Self {
    Self::from_source(Arc::new(MemoryResource::new(data.into())))
  }

  pub fn from_file(path: impl Into<PathBuf>) -> Self {
    Self::from_source(Arc::new(FileResource::new(path)))
  }

  pub fn from_storage(storage: Storage, key: &str) -> Self {
    Self::from_source(Arc::new(StorageResource::new(storage, key)))
  }

  /// A resource addressed by URL. Supports `http`, `https`, `file` and
  /// `data`; nothing is fetched here.
  pub fn from_url(url: Url) -> Result<Self, ValueError> {
    let source: Arc<dyn ResourceSource> = match url.scheme() {
      "http" | "https" => Arc::new(HttpResource::new(url)),
      "data" => Arc::new(DataUrlResource::new(url)),
      "file" => {
        let path = url
          .to_file_path()
          .map_err(|_| ValueError::InvalidUrl(url.to_string()))?;
        Arc::new(FileResource::new(path))
      }
      other => return Err(ValueError::UnsupportedScheme(other.to_string())),
    };
    Ok(Self::from_source(source))
  }

  /// The whole payload, fetched at most once.
  pub async fn get(&self) -> Result<Bytes, ValueError> {
    let mut cache = self.cache.lock().await;
    if let Some(data) = cache.as_ref() {
      return Ok(data.clone());
    }
    let data = self.source.read().await?;
    *cache = Some(data.clone());
    Ok(data)
  }

  /// Stream the payload. Served from the cache when already fetched.
  pub async fn open(&self) -> Result<ValueStream, ValueError> {
    if let Some(data) = self.cache.lock().await.as_ref() {
      return Ok(once(data.clone()));
    }
    self.source.open().await
  }

  pub fn url(&self) -> Option<Url> {
    self.source.url()
  }

  /// The URL of the payload, or an inline base64 `data:` URL when the
  /// resource has no address.
  pub async fn to_url(&self, mime_type: &str) -> Result<Url, ValueError> {
    match self.url() {
      Some(url) => Ok(url),
      None => DataUrlResource::encode(mime_type, &self.get().await?),
    }
  }

  /// Replace this resource's bytes with those of `other`.
  pub async fn copy_from(&self, other: &ResourceValue) -> Result<(), ValueError> {
    let data = other.get().await?;
    self.source.write(data.clone()).await?;
    *self.cache.lock().await = Some(data);
    Ok(())
  }
}

impl fmt::Debug for ResourceValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceValue")
      .field("source", &self.source)
      .finish()
  }
}
