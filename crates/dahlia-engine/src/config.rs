use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Engine-wide timing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// First delay between `wait_for_complete` calls. Doubles after every
  /// non-terminal answer.
  pub poll_initial_interval: Duration,
  pub poll_max_interval: Duration,
  /// Fail a step whose artifact is still running after this long.
  pub poll_timeout: Option<Duration>,
  /// How long a new instance has to serve its manifest.
  pub tool_online_timeout: Duration,
  pub tool_online_interval: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      poll_initial_interval: Duration::from_millis(500),
      poll_max_interval: Duration::from_secs(10),
      poll_timeout: None,
      tool_online_timeout: Duration::from_secs(60),
      tool_online_interval: Duration::from_secs(1),
    }
  }
}

impl EngineConfig {
  /// The delay that follows `interval`.
  pub fn next_poll_interval(&self, interval: Duration) -> Duration {
    (interval * 2).min(self.poll_max_interval)
  }
}

/// Per-execution settings, persisted as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleExecutionConfig {
  /// Selects the runtime by scheme.
  pub runtime_url: Url,

  /// Variables readable by `environment` expressions.
  #[serde(default)]
  pub environment: BTreeMap<String, String>,

  /// Passed verbatim to the runtime when the application is created.
  #[serde(default)]
  pub application: serde_json::Value,
}

impl SimpleExecutionConfig {
  pub fn new(runtime_url: Url) -> Self {
    Self {
      runtime_url,
      environment: BTreeMap::new(),
      application: serde_json::Value::Null,
    }
  }
}
