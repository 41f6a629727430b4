use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A worker of another execution, mirrored read-only into this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDef {
  /// Storage location of the other executor. `None` means the local one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub executor: Option<String>,
  pub execution: String,
  pub worker: String,
}

impl FromStr for SourceDef {
  type Err = ConfigError;

  /// Parses `EXECUTION:WORKER[@EXECUTOR]`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ConfigError::InvalidSource(s.to_string());
    let (reference, executor) = match s.split_once('@') {
      Some((reference, executor)) if !executor.is_empty() => {
        (reference, Some(executor.to_string()))
      }
      Some(_) => return Err(invalid()),
      None => (s, None),
    };
    let (execution, worker) = reference.split_once(':').ok_or_else(invalid)?;
    if execution.is_empty() || worker.is_empty() {
      return Err(invalid());
    }
    Ok(Self {
      executor,
      execution: execution.to_string(),
      worker: worker.to_string(),
    })
  }
}

impl fmt::Display for SourceDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.execution, self.worker)?;
    if let Some(executor) = &self.executor {
      write!(f, "@{}", executor)?;
    }
    Ok(())
  }
}
