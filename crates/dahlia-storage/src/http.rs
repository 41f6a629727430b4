use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::backend::{ByteStream, StorageBackend};
use crate::error::StorageError;
use crate::path::validate;

/// Directory listing document served by a mirror for `GET <dir>/`.
#[derive(Debug, Deserialize)]
struct Listing {
  entries: Vec<ListingEntry>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
  name: String,
}

/// Read-only storage backend over an HTTP mirror.
///
/// Files are fetched with `GET {base}/{key}`; directories answer
/// `GET {base}/{key}/` with a JSON listing. Every mutating call fails with
/// [`StorageError::ReadOnly`].
pub struct HttpBackend {
  base: Url,
  client: Client,
}

impl HttpBackend {
  /// Create a backend rooted at `base`.
  pub fn new(mut base: Url) -> Self {
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    Self {
      base,
      client: Client::new(),
    }
  }

  fn url_for(&self, key: &str, dir: bool) -> Result<Url, StorageError> {
    validate(key)?;
    let mut relative = key.trim_matches('/').to_string();
    if dir && !relative.is_empty() {
      relative.push('/');
    }
    self
      .base
      .join(&relative)
      .map_err(|_| StorageError::InvalidPath(key.to_string()))
  }

  fn read_only(&self, key: &str) -> StorageError {
    StorageError::ReadOnly(format!("{}{}", self.base, key))
  }

  async fn fetch_listing(&self, key: &str) -> Result<Option<Listing>, StorageError> {
    let url = self.url_for(key, true)?;
    let response = self
      .client
      .get(url.clone())
      .header(reqwest::header::ACCEPT, "application/json")
      .send()
      .await?;

    match response.status() {
      StatusCode::OK => {
        let listing = response
          .json::<Listing>()
          .await
          .map_err(|e| StorageError::InvalidListing {
            path: key.to_string(),
            message: e.to_string(),
          })?;
        Ok(Some(listing))
      }
      StatusCode::NOT_FOUND => Ok(None),
      status => Err(StorageError::Http {
        status: status.as_u16(),
        url: url.to_string(),
      }),
    }
  }
}

#[async_trait]
impl StorageBackend for HttpBackend {
  async fn open(&self, path: &str) -> Result<ByteStream, StorageError> {
    let url = self.url_for(path, false)?;
    let response = self.client.get(url.clone()).send().await?;

    match response.status() {
      StatusCode::OK => {
        let stream = response
          .bytes_stream()
          .map(|r| r.map_err(StorageError::Transport));
        Ok(Box::pin(stream))
      }
      StatusCode::NOT_FOUND => Err(StorageError::NotFound(path.to_string())),
      status => Err(StorageError::Http {
        status: status.as_u16(),
        url: url.to_string(),
      }),
    }
  }

  async fn write(&self, path: &str, _data: Bytes) -> Result<(), StorageError> {
    Err(self.read_only(path))
  }

  async fn exists(&self, path: &str) -> Result<bool, StorageError> {
    let url = self.url_for(path, false)?;
    let response = self.client.head(url.clone()).send().await?;
    match response.status() {
      StatusCode::OK => Ok(true),
      StatusCode::NOT_FOUND => Ok(self.fetch_listing(path).await?.is_some()),
      status => Err(StorageError::Http {
        status: status.as_u16(),
        url: url.to_string(),
      }),
    }
  }

  async fn is_dir(&self, path: &str) -> Result<bool, StorageError> {
    Ok(self.fetch_listing(path).await?.is_some())
  }

  async fn make_dirs(&self, path: &str) -> Result<(), StorageError> {
    Err(self.read_only(path))
  }

  async fn delete(&self, path: &str) -> Result<(), StorageError> {
    Err(self.read_only(path))
  }

  async fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
    let mut names: Vec<String> = match self.fetch_listing(path).await? {
      Some(listing) => listing.entries.into_iter().map(|e| e.name).collect(),
      None => Vec::new(),
    };
    names.sort();
    Ok(names)
  }

  async fn rename(&self, from: &str, _to: &str) -> Result<(), StorageError> {
    Err(self.read_only(from))
  }

  async fn copy(&self, from: &str, _to: &str) -> Result<(), StorageError> {
    Err(self.read_only(from))
  }

  fn location(&self) -> String {
    self.base.to_string()
  }
}
