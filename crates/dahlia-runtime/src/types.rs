use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// What to build or pull for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
  pub name: String,
}

/// A built image, ready to instantiate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
  pub name: String,
}

/// How to start an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
  pub image: Image,

  #[serde(default)]
  pub environment: BTreeMap<String, String>,

  /// Serve the data of an existing instance instead of fresh state.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub clone_of: Option<InstanceRef>,

  #[serde(default)]
  pub read_only: bool,
}

impl InstanceConfig {
  pub fn new(image: Image) -> Self {
    Self {
      image,
      environment: BTreeMap::new(),
      clone_of: None,
      read_only: false,
    }
  }
}

/// Persistable handle to an instance, enough to find it again or clone it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
  pub application: String,
  pub name: String,
  pub image: String,
  pub url: Url,
}

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
  Running,
  Stopped,
  Missing,
}

impl fmt::Display for InstanceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      InstanceStatus::Running => "running",
      InstanceStatus::Stopped => "stopped",
      InstanceStatus::Missing => "missing",
    })
  }
}

impl FromStr for InstanceStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "running" => Ok(InstanceStatus::Running),
      "stopped" => Ok(InstanceStatus::Stopped),
      "missing" => Ok(InstanceStatus::Missing),
      other => Err(format!("unknown instance status: {}", other)),
    }
  }
}
