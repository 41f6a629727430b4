use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use dahlia_value::ValueKind;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Action invoked when a step does not name one and the tool has several.
pub const DEFAULT_ACTION: &str = "create";

/// What a tool can do, served at `GET /manifest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  /// Format of the data directory of every artifact this tool produces.
  #[serde(default)]
  pub data_format: Option<String>,

  #[serde(default)]
  pub actions: BTreeMap<String, ActionDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDecl {
  #[serde(default)]
  pub parameters: BTreeMap<String, ParameterDecl>,

  #[serde(default)]
  pub metrics: BTreeMap<String, MetricDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
  #[serde(rename = "type")]
  pub kind: ValueKind,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDecl {
  #[serde(rename = "type")]
  pub kind: String,
}

impl Manifest {
  /// Pick the action a step runs.
  ///
  /// An explicit name must be declared. Without one, a tool with a single
  /// action runs it; otherwise [`DEFAULT_ACTION`] must be declared.
  pub fn action(&self, name: Option<&str>) -> Result<(&str, &ActionDecl), ToolError> {
    let name = match name {
      Some(name) => name,
      None if self.actions.len() == 1 => self
        .actions
        .keys()
        .next()
        .map_or(DEFAULT_ACTION, String::as_str),
      None => DEFAULT_ACTION,
    };
    self
      .actions
      .get_key_value(name)
      .map(|(key, action)| (key.as_str(), action))
      .ok_or_else(|| ToolError::UnknownAction(name.to_string()))
  }
}

/// Remote state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactStatus {
  Pending,
  InProgress,
  Completed,
  Failed,
}

impl ArtifactStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, ArtifactStatus::Completed | ArtifactStatus::Failed)
  }
}

impl fmt::Display for ArtifactStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      ArtifactStatus::Pending => "pending",
      ArtifactStatus::InProgress => "in-progress",
      ArtifactStatus::Completed => "completed",
      ArtifactStatus::Failed => "failed",
    })
  }
}

impl FromStr for ArtifactStatus {
  type Err = ToolError;

  /// Accepts the bare status or a JSON string.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().trim_matches('"') {
      "pending" => Ok(ArtifactStatus::Pending),
      "in-progress" => Ok(ArtifactStatus::InProgress),
      "completed" => Ok(ArtifactStatus::Completed),
      "failed" => Ok(ArtifactStatus::Failed),
      other => Err(ToolError::InvalidResponse(format!(
        "unknown artifact status: {}",
        other
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest(actions: &[&str]) -> Manifest {
    Manifest {
      data_format: None,
      actions: actions
        .iter()
        .map(|name| (name.to_string(), ActionDecl::default()))
        .collect(),
    }
  }

  #[test]
  fn test_decode_manifest() {
    let manifest: Manifest = serde_json::from_str(
      r#"{
        "data_format": "tfrecord",
        "actions": {
          "train": {
            "parameters": {
              "dataset": {"type": "archive"},
              "epochs": {"type": "plain-object", "description": "passes"}
            },
            "metrics": {"loss": {"type": "float"}}
          }
        }
      }"#,
    )
    .unwrap();

    let (name, action) = manifest.action(None).unwrap();
    assert_eq!(name, "train");
    assert_eq!(action.parameters["dataset"].kind, ValueKind::Archive);
    assert_eq!(action.metrics["loss"].kind, "float");
  }

  #[test]
  fn test_action_selection() {
    assert_eq!(manifest(&["create", "evaluate"]).action(None).unwrap().0, "create");
    assert_eq!(
      manifest(&["create", "evaluate"]).action(Some("evaluate")).unwrap().0,
      "evaluate"
    );
    assert!(matches!(
      manifest(&["train", "evaluate"]).action(None),
      Err(ToolError::UnknownAction(name)) if name == "create"
    ));
    assert!(matches!(
      manifest(&["train"]).action(Some("export")),
      Err(ToolError::UnknownAction(_))
    ));
  }

  #[test]
  fn test_status_parsing() {
    assert_eq!(
      "in-progress".parse::<ArtifactStatus>().unwrap(),
      ArtifactStatus::InProgress
    );
    assert_eq!(
      "\"completed\"\n".parse::<ArtifactStatus>().unwrap(),
      ArtifactStatus::Completed
    );
    assert!("done".parse::<ArtifactStatus>().is_err());
    assert!(ArtifactStatus::Failed.is_terminal());
    assert!(!ArtifactStatus::Pending.is_terminal());
  }
}
