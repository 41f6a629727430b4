use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::RuntimeError;
use crate::types::{Image, ImageConfig, InstanceConfig, InstanceRef, InstanceStatus};

/// A substrate that turns images into reachable HTTP endpoints.
#[async_trait]
pub trait Runtime: Send + Sync {
  /// Create the application that will own an execution's instances.
  async fn create_application(
    &self,
    name: &str,
    config: &serde_json::Value,
  ) -> Result<Arc<dyn Application>, RuntimeError>;

  async fn get_application(&self, name: &str) -> Result<Option<Arc<dyn Application>>, RuntimeError>;
}

/// A group of instances with a shared lifetime.
#[async_trait]
pub trait Application: Send + Sync {
  fn name(&self) -> &str;

  async fn create_image(&self, config: &ImageConfig) -> Result<Image, RuntimeError>;

  async fn create_instance(
    &self,
    name: &str,
    config: &InstanceConfig,
  ) -> Result<Arc<dyn Instance>, RuntimeError>;

  async fn get_instance(&self, name: &str) -> Result<Option<Arc<dyn Instance>>, RuntimeError>;

  /// Delete the application and every instance it owns.
  async fn delete(&self) -> Result<(), RuntimeError>;
}

/// One running (or stopped) service.
#[async_trait]
pub trait Instance: Send + Sync {
  fn name(&self) -> &str;

  fn image(&self) -> &str;

  /// Base URL of the service.
  fn url(&self) -> &Url;

  fn application(&self) -> &str;

  async fn status(&self) -> Result<InstanceStatus, RuntimeError>;

  async fn start(&self) -> Result<(), RuntimeError>;

  async fn stop(&self) -> Result<(), RuntimeError>;

  async fn delete(&self) -> Result<(), RuntimeError>;

  fn reference(&self) -> InstanceRef {
    InstanceRef {
      application: self.application().to_string(),
      name: self.name().to_string(),
      image: self.image().to_string(),
      url: self.url().clone(),
    }
  }
}

/// Runtimes by URL scheme.
#[derive(Default, Clone)]
pub struct RuntimeRegistry {
  runtimes: HashMap<String, Arc<dyn Runtime>>,
}

impl RuntimeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, scheme: &str, runtime: Arc<dyn Runtime>) {
    self.runtimes.insert(scheme.to_string(), runtime);
  }

  /// The runtime serving `url`'s scheme.
  pub fn resolve(&self, url: &Url) -> Result<Arc<dyn Runtime>, RuntimeError> {
    self
      .runtimes
      .get(url.scheme())
      .cloned()
      .ok_or_else(|| RuntimeError::UnknownRuntime(url.to_string()))
  }
}
