use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use dahlia_engine::{EngineConfig, SimpleExecutionConfig};
use serde::Deserialize;
use url::Url;

pub const CONFIG_FILE: &str = "dahlia.toml";

const DEFAULT_RUNTIME_URL: &str = "external://local";

/// Contents of `<data-dir>/dahlia.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DahliaConfig {
  pub runtime_url: Option<Url>,
  pub environment: BTreeMap<String, String>,
  /// Image name to the endpoint already serving it.
  pub endpoints: BTreeMap<String, Url>,
  pub poll: PollConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollConfig {
  pub initial_interval_ms: Option<u64>,
  pub max_interval_ms: Option<u64>,
  pub timeout_secs: Option<u64>,
  pub tool_online_timeout_secs: Option<u64>,
}

impl DahliaConfig {
  /// Read the config file under `data_dir`, or the defaults when there is
  /// none.
  pub fn load(data_dir: &Path) -> Result<Self> {
    let path = data_dir.join(CONFIG_FILE);
    if !path.exists() {
      return Ok(Self::default());
    }
    let text = std::fs::read_to_string(&path)
      .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
  }

  pub fn engine_config(&self) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(ms) = self.poll.initial_interval_ms {
      config.poll_initial_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = self.poll.max_interval_ms {
      config.poll_max_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = self.poll.timeout_secs {
      config.poll_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = self.poll.tool_online_timeout_secs {
      config.tool_online_timeout = Duration::from_secs(secs);
    }
    config
  }

  /// Settings for a new execution. `runtime_url` and `environment` from the
  /// command line win over the file.
  pub fn execution_config(
    &self,
    runtime_url: Option<Url>,
    environment: BTreeMap<String, String>,
  ) -> Result<SimpleExecutionConfig> {
    let runtime_url = match runtime_url.or_else(|| self.runtime_url.clone()) {
      Some(url) => url,
      None => Url::parse(DEFAULT_RUNTIME_URL).context("invalid default runtime url")?,
    };
    let mut config = SimpleExecutionConfig::new(runtime_url);
    config.environment = self.environment.clone();
    config.environment.extend(environment);
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = DahliaConfig::load(dir.path()).unwrap();
    assert_eq!(config, DahliaConfig::default());
    assert_eq!(config.engine_config(), EngineConfig::default());

    let execution = config.execution_config(None, BTreeMap::new()).unwrap();
    assert_eq!(execution.runtime_url.as_str(), "external://local");
  }

  #[test]
  fn test_load_and_override() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join(CONFIG_FILE),
      r#"
runtime_url = "external://lab"

[environment]
DATA_ROOT = "/data"
REGION = "eu"

[endpoints]
"dahlia/import" = "http://import.local:8000/"

[poll]
initial_interval_ms = 100
timeout_secs = 600
"#,
    )
    .unwrap();

    let config = DahliaConfig::load(dir.path()).unwrap();
    assert_eq!(
      config.endpoints["dahlia/import"].as_str(),
      "http://import.local:8000/"
    );

    let engine = config.engine_config();
    assert_eq!(engine.poll_initial_interval, Duration::from_millis(100));
    assert_eq!(engine.poll_timeout, Some(Duration::from_secs(600)));
    assert_eq!(engine.poll_max_interval, Duration::from_secs(10));

    let mut environment = BTreeMap::new();
    environment.insert("REGION".to_string(), "us".to_string());
    let execution = config.execution_config(None, environment).unwrap();
    assert_eq!(execution.runtime_url.as_str(), "external://lab");
    assert_eq!(execution.environment["DATA_ROOT"], "/data");
    assert_eq!(execution.environment["REGION"], "us");

    let runtime = Url::parse("external://other").unwrap();
    let execution = config.execution_config(Some(runtime), BTreeMap::new()).unwrap();
    assert_eq!(execution.runtime_url.as_str(), "external://other");
  }

  #[test]
  fn test_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), "runtime_url = 3").unwrap();
    assert!(DahliaConfig::load(dir.path()).is_err());
  }
}
