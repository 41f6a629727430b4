use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dahlia_storage::Storage;
use dahlia_storage::stored::{
  JsonField, StoredNamedObjectMap, StoredObject, StringField, TextField,
};
use tracing::info;
use url::Url;

use crate::error::RuntimeError;
use crate::runtime::{Application, Instance, Runtime};
use crate::types::{Image, ImageConfig, InstanceConfig, InstanceStatus};

/// Runtime for services that are already running somewhere.
///
/// Each image name maps to a fixed endpoint. Creating an instance records
/// which endpoint serves it; clones share their origin's endpoint. Nothing
/// is started or stopped remotely, only the recorded state changes.
pub struct ExternalRuntime {
  storage: Storage,
  endpoints: Arc<BTreeMap<String, Url>>,
}

impl ExternalRuntime {
  pub fn new(storage: Storage, endpoints: BTreeMap<String, Url>) -> Self {
    Self {
      storage,
      endpoints: Arc::new(endpoints),
    }
  }

  fn applications(&self) -> StoredNamedObjectMap<ApplicationRecord> {
    StoredNamedObjectMap::new(self.storage.clone())
  }

  fn open(&self, name: &str, record: ApplicationRecord) -> Arc<dyn Application> {
    Arc::new(ExternalApplication {
      name: name.to_string(),
      record,
      endpoints: self.endpoints.clone(),
    })
  }
}

struct ApplicationRecord {
  storage: Storage,
}

impl StoredObject for ApplicationRecord {
  const KIND: &'static str = "application";

  fn open(storage: Storage) -> Self {
    Self { storage }
  }
}

impl ApplicationRecord {
  fn config(&self) -> JsonField<serde_json::Value> {
    JsonField::new(&self.storage, "config.json")
  }

  fn instances(&self) -> StoredNamedObjectMap<InstanceRecord> {
    StoredNamedObjectMap::new(self.storage.substorage("instances"))
  }
}

struct InstanceRecord {
  storage: Storage,
}

impl StoredObject for InstanceRecord {
  const KIND: &'static str = "instance";

  fn open(storage: Storage) -> Self {
    Self { storage }
  }
}

impl InstanceRecord {
  fn image(&self) -> StringField {
    StringField::required(&self.storage, "image")
  }

  fn url(&self) -> TextField<Url> {
    TextField::required(&self.storage, "url")
  }

  fn status(&self) -> TextField<InstanceStatus> {
    TextField::required(&self.storage, "status")
  }

  fn read_only(&self) -> TextField<bool> {
    TextField::new(&self.storage, "read_only")
  }
}

#[async_trait]
impl Runtime for ExternalRuntime {
  async fn create_application(
    &self,
    name: &str,
    config: &serde_json::Value,
  ) -> Result<Arc<dyn Application>, RuntimeError> {
    let applications = self.applications();
    if applications.contains(name).await? {
      return Err(RuntimeError::ApplicationExists(name.to_string()));
    }
    let record = applications.create(name).await?;
    record.config().set(config).await?;
    info!(application = %name, "application_created");
    Ok(self.open(name, record))
  }

  async fn get_application(&self, name: &str) -> Result<Option<Arc<dyn Application>>, RuntimeError> {
    let applications = self.applications();
    if !applications.contains(name).await? {
      return Ok(None);
    }
    let record = applications.get(name).await?;
    Ok(Some(self.open(name, record)))
  }
}

struct ExternalApplication {
  name: String,
  record: ApplicationRecord,
  endpoints: Arc<BTreeMap<String, Url>>,
}

#[async_trait]
impl Application for ExternalApplication {
  fn name(&self) -> &str {
    &self.name
  }

  async fn create_image(&self, config: &ImageConfig) -> Result<Image, RuntimeError> {
    if !self.endpoints.contains_key(&config.name) {
      return Err(RuntimeError::ImageNotFound(config.name.clone()));
    }
    Ok(Image {
      name: config.name.clone(),
    })
  }

  async fn create_instance(
    &self,
    name: &str,
    config: &InstanceConfig,
  ) -> Result<Arc<dyn Instance>, RuntimeError> {
    let instances = self.record.instances();
    if instances.contains(name).await? {
      return Err(RuntimeError::InstanceExists(name.to_string()));
    }

    let url = match &config.clone_of {
      Some(origin) => origin.url.clone(),
      None => self
        .endpoints
        .get(&config.image.name)
        .cloned()
        .ok_or_else(|| RuntimeError::ImageNotFound(config.image.name.clone()))?,
    };

    let record = instances.create(name).await?;
    record.image().set(&config.image.name).await?;
    record.url().set(&url).await?;
    record.status().set(&InstanceStatus::Running).await?;
    record.read_only().set(&config.read_only).await?;

    info!(application = %self.name, instance = %name, %url, "instance_created");
    Ok(Arc::new(ExternalInstance {
      application: self.name.clone(),
      name: name.to_string(),
      image: config.image.name.clone(),
      url,
      record,
    }))
  }

  async fn get_instance(&self, name: &str) -> Result<Option<Arc<dyn Instance>>, RuntimeError> {
    let instances = self.record.instances();
    if !instances.contains(name).await? {
      return Ok(None);
    }
    let record = instances.get(name).await?;
    Ok(Some(Arc::new(ExternalInstance {
      application: self.name.clone(),
      name: name.to_string(),
      image: record.image().require().await?,
      url: record.url().require().await?,
      record,
    })))
  }

  async fn delete(&self) -> Result<(), RuntimeError> {
    self.record.storage.delete("").await?;
    info!(application = %self.name, "application_deleted");
    Ok(())
  }
}

struct ExternalInstance {
  application: String,
  name: String,
  image: String,
  url: Url,
  record: InstanceRecord,
}

#[async_trait]
impl Instance for ExternalInstance {
  fn name(&self) -> &str {
    &self.name
  }

  fn image(&self) -> &str {
    &self.image
  }

  fn url(&self) -> &Url {
    &self.url
  }

  fn application(&self) -> &str {
    &self.application
  }

  async fn status(&self) -> Result<InstanceStatus, RuntimeError> {
    if !self.record.storage.exists("status").await? {
      return Ok(InstanceStatus::Missing);
    }
    Ok(self.record.status().require().await?)
  }

  async fn start(&self) -> Result<(), RuntimeError> {
    self.set_status(InstanceStatus::Running).await
  }

  async fn stop(&self) -> Result<(), RuntimeError> {
    self.set_status(InstanceStatus::Stopped).await
  }

  async fn delete(&self) -> Result<(), RuntimeError> {
    self.record.storage.delete("").await?;
    Ok(())
  }
}

impl ExternalInstance {
  async fn set_status(&self, status: InstanceStatus) -> Result<(), RuntimeError> {
    if !self.record.storage.exists("status").await? {
      return Err(RuntimeError::InstanceNotFound(self.name.clone()));
    }
    self.record.status().set(&status).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn runtime() -> ExternalRuntime {
    let mut endpoints = BTreeMap::new();
    endpoints.insert(
      "dahlia/import".to_string(),
      Url::parse("http://import.local:8000/").unwrap(),
    );
    ExternalRuntime::new(Storage::memory(), endpoints)
  }

  #[tokio::test]
  async fn test_instance_lifecycle() {
    let runtime = runtime();
    let application = runtime
      .create_application("run-1", &serde_json::json!({}))
      .await
      .unwrap();

    let image = application
      .create_image(&ImageConfig {
        name: "dahlia/import".into(),
      })
      .await
      .unwrap();
    let instance = application
      .create_instance("worker-import", &InstanceConfig::new(image))
      .await
      .unwrap();
    assert_eq!(instance.url().as_str(), "http://import.local:8000/");
    assert_eq!(instance.status().await.unwrap(), InstanceStatus::Running);

    instance.stop().await.unwrap();
    let found = application
      .get_instance("worker-import")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(found.status().await.unwrap(), InstanceStatus::Stopped);
    assert_eq!(found.reference(), instance.reference());

    instance.delete().await.unwrap();
    assert_eq!(instance.status().await.unwrap(), InstanceStatus::Missing);
    assert!(application.get_instance("worker-import").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_clone_shares_endpoint() {
    let runtime = runtime();
    let application = runtime
      .create_application("run-2", &serde_json::json!({}))
      .await
      .unwrap();
    let origin = application
      .create_instance(
        "worker-import",
        &InstanceConfig::new(Image {
          name: "dahlia/import".into(),
        }),
      )
      .await
      .unwrap();

    let mut config = InstanceConfig::new(Image {
      name: origin.image().to_string(),
    });
    config.clone_of = Some(origin.reference());
    config.read_only = true;
    let clone = application
      .create_instance("source-import", &config)
      .await
      .unwrap();

    assert_eq!(clone.url(), origin.url());
  }

  #[tokio::test]
  async fn test_errors() {
    let runtime = runtime();
    let application = runtime
      .create_application("run-3", &serde_json::json!({}))
      .await
      .unwrap();

    assert!(matches!(
      runtime.create_application("run-3", &serde_json::json!({})).await,
      Err(RuntimeError::ApplicationExists(_))
    ));
    assert!(matches!(
      application
        .create_image(&ImageConfig {
          name: "dahlia/unknown".into()
        })
        .await,
      Err(RuntimeError::ImageNotFound(_))
    ));

    assert!(runtime.get_application("run-3").await.unwrap().is_some());
    application.delete().await.unwrap();
    assert!(runtime.get_application("run-3").await.unwrap().is_none());
  }
}
