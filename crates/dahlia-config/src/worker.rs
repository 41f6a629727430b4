use std::collections::BTreeMap;

use dahlia_value::ValueKind;
use serde::{Deserialize, Serialize};

/// Recipe for a worker's instance.
///
/// `image` and every `environment` entry are expressions, evaluated when the
/// worker is first created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDef {
  pub image: serde_json::Value,

  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub environment: BTreeMap<String, serde_json::Value>,
}

/// An externally visible result of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  #[serde(default)]
  pub label: String,
}

/// A declared workflow input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
  /// Kind the bound argument is converted to.
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<ValueKind>,

  /// Used when no argument is supplied.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<serde_json::Value>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}
