use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dahlia_value::Value;
use url::Url;

use crate::error::ToolError;
use crate::manifest::{ArtifactStatus, Manifest};

/// Request to create an artifact by running an action.
#[derive(Debug, Clone)]
pub struct CreateArtifact {
  pub artifact_name: String,
  pub action: String,
  pub arguments: BTreeMap<String, Value>,
}

/// The action-invocation protocol served by a worker instance.
#[async_trait]
pub trait Tool: Send + Sync {
  async fn manifest(&self) -> Result<Manifest, ToolError>;

  /// Start the action; returns the index of the command in the artifact's
  /// history.
  async fn create_artifact(&self, request: &CreateArtifact) -> Result<usize, ToolError>;

  /// Wait a bounded time for the artifact's command, then report its status.
  async fn wait_for_complete(&self, artifact: &str) -> Result<ArtifactStatus, ToolError>;

  /// Current status; [`ToolError::ArtifactNotFound`] when it does not exist.
  async fn status(&self, artifact: &str) -> Result<ArtifactStatus, ToolError>;

  /// Remove an artifact that is not in progress. Missing artifacts are fine.
  async fn delete_artifact(&self, artifact: &str) -> Result<(), ToolError>;

  /// Log text of one command in the artifact's history.
  async fn log(&self, artifact: &str, command_index: usize) -> Result<String, ToolError>;

  /// Ask the running command to stop at its next opportunity.
  async fn interrupt(&self, artifact: &str) -> Result<(), ToolError>;
}

/// Opens a [`Tool`] for an instance URL.
pub trait ToolConnector: Send + Sync {
  fn connect(&self, url: &Url) -> Result<Arc<dyn Tool>, ToolError>;
}
