use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry of a workflow's ordered step list.
///
/// An action step names a worker and the artifact it creates there; a wait
/// step (`wait: true`) only suspends the execution and assigns outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub wait: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub worker: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artifact: Option<String>,

  /// Manifest action to run. Defaults to the tool's only action, or
  /// `create` when it declares several.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub action: Option<String>,

  /// Argument expressions, by action parameter name.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub arguments: BTreeMap<String, serde_json::Value>,

  /// Output satisfied by this step's own artifact.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<String>,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub outputs: Vec<OutputAssignment>,
}

impl StepDef {
  /// Step name for logs: the declared name, or the index.
  pub fn label(&self, index: usize) -> String {
    self.name.clone().unwrap_or_else(|| index.to_string())
  }
}

/// Points an output at an artifact when a step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAssignment {
  pub output: String,
  #[serde(flatten)]
  pub from: AssignmentSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignmentSource {
  /// The artifact produced by a named step.
  Step { step: String },
  /// An artifact addressed directly on a worker.
  Artifact { worker: String, artifact: String },
}
