#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dahlia_config::WorkflowDef;
use dahlia_engine::{
  EngineConfig, Execution, ExecutionNotifier, Executor, NewExecution, SimpleExecutionConfig,
};
use dahlia_runtime::{ExternalRuntime, RuntimeRegistry};
use dahlia_storage::Storage;
use dahlia_tool::{ArtifactStatus, CreateArtifact, Manifest, Tool, ToolConnector, ToolError};
use dahlia_value::Value;
use serde_json::json;
use url::Url;

pub const IMPORT_URL: &str = "http://import.local:8000/";
pub const EXPORT_URL: &str = "http://export.local:8000/";
pub const RUNTIME_URL: &str = "external://local";

pub const SCENARIO: &str = r#"
parameters:
  dataset:
    type: url
  epochs:
    default: 3
workers:
  importer:
    image: dahlia/import
  exporter:
    image: dahlia/export
    environment:
      FORMAT: onnx
outputs:
  result:
    label: Exported model
steps:
  - name: import
    worker: importer
    artifact: dataset
    arguments:
      source:
        type: workflow-parameter
        name: dataset
  - name: export
    worker: exporter
    artifact: model
    arguments:
      input:
        type: artifact
        step: import
      epochs:
        type: workflow-parameter
        name: epochs
  - name: review
    wait: true
    outputs:
      - output: result
        step: export
"#;

pub fn scenario() -> WorkflowDef {
  WorkflowDef::from_yaml(SCENARIO).unwrap()
}

#[derive(Debug)]
pub struct RemoteArtifact {
  pub status: ArtifactStatus,
  pub remaining_polls: usize,
  pub commands: usize,
}

#[derive(Debug, Default)]
pub struct ToolState {
  pub artifacts: HashMap<String, RemoteArtifact>,
  pub requests: Vec<CreateArtifact>,
  pub deleted: Vec<String>,
  pub interrupts: usize,
  /// Artifacts whose next command fails.
  pub failing: HashSet<String>,
  /// Non-terminal answers before a command finishes.
  pub polls_before_done: usize,
  pub offline: bool,
}

/// In-process stand-in for a worker's tool.
pub struct MockTool {
  url: Url,
  manifest: Manifest,
  pub state: Mutex<ToolState>,
}

impl MockTool {
  pub fn new(url: &str, manifest: serde_json::Value) -> Arc<Self> {
    Arc::new(Self {
      url: Url::parse(url).unwrap(),
      manifest: serde_json::from_value(manifest).unwrap(),
      state: Mutex::new(ToolState::default()),
    })
  }

  pub fn state(&self) -> std::sync::MutexGuard<'_, ToolState> {
    self.state.lock().unwrap()
  }

  pub fn request_count(&self) -> usize {
    self.state().requests.len()
  }

  pub fn last_request(&self) -> CreateArtifact {
    self.state().requests.last().cloned().unwrap()
  }
}

#[async_trait]
impl Tool for MockTool {
  async fn manifest(&self) -> Result<Manifest, ToolError> {
    if self.state().offline {
      return Err(ToolError::Status {
        status: 503,
        url: self.url.to_string(),
      });
    }
    Ok(self.manifest.clone())
  }

  async fn create_artifact(&self, request: &CreateArtifact) -> Result<usize, ToolError> {
    let mut state = self.state();
    state.requests.push(request.clone());
    let polls = state.polls_before_done;
    let artifact = state
      .artifacts
      .entry(request.artifact_name.clone())
      .or_insert(RemoteArtifact {
        status: ArtifactStatus::Pending,
        remaining_polls: 0,
        commands: 0,
      });
    artifact.status = ArtifactStatus::InProgress;
    artifact.remaining_polls = polls;
    artifact.commands += 1;
    Ok(artifact.commands - 1)
  }

  async fn wait_for_complete(&self, name: &str) -> Result<ArtifactStatus, ToolError> {
    let mut state = self.state();
    let fails = state.failing.contains(name);
    let artifact = state
      .artifacts
      .get_mut(name)
      .ok_or_else(|| ToolError::ArtifactNotFound(name.to_string()))?;
    if artifact.status == ArtifactStatus::InProgress {
      if artifact.remaining_polls > 0 {
        artifact.remaining_polls -= 1;
      } else if fails {
        artifact.status = ArtifactStatus::Failed;
      } else {
        artifact.status = ArtifactStatus::Completed;
      }
    }
    Ok(artifact.status)
  }

  async fn status(&self, name: &str) -> Result<ArtifactStatus, ToolError> {
    self
      .state()
      .artifacts
      .get(name)
      .map(|artifact| artifact.status)
      .ok_or_else(|| ToolError::ArtifactNotFound(name.to_string()))
  }

  async fn delete_artifact(&self, name: &str) -> Result<(), ToolError> {
    let mut state = self.state();
    if state.artifacts.remove(name).is_some() {
      state.deleted.push(name.to_string());
    }
    Ok(())
  }

  async fn log(&self, name: &str, command_index: usize) -> Result<String, ToolError> {
    if !self.state().artifacts.contains_key(name) {
      return Err(ToolError::ArtifactNotFound(name.to_string()));
    }
    Ok(format!("{} command {}", name, command_index))
  }

  async fn interrupt(&self, _name: &str) -> Result<(), ToolError> {
    self.state().interrupts += 1;
    Ok(())
  }
}

pub struct MockConnector {
  tools: HashMap<String, Arc<MockTool>>,
}

impl ToolConnector for MockConnector {
  fn connect(&self, url: &Url) -> Result<Arc<dyn Tool>, ToolError> {
    self
      .tools
      .get(url.as_str())
      .map(|tool| tool.clone() as Arc<dyn Tool>)
      .ok_or_else(|| ToolError::InvalidUrl(url.to_string()))
  }
}

pub fn fast_config() -> EngineConfig {
  EngineConfig {
    poll_initial_interval: Duration::from_millis(1),
    poll_max_interval: Duration::from_millis(4),
    poll_timeout: None,
    tool_online_timeout: Duration::from_millis(30),
    tool_online_interval: Duration::from_millis(5),
  }
}

/// Two tools behind an external runtime, all state in one memory storage.
pub struct Harness {
  pub storage: Storage,
  pub runtime: Arc<ExternalRuntime>,
  pub importer: Arc<MockTool>,
  pub exporter: Arc<MockTool>,
  pub executor: Executor,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_config(fast_config())
  }

  pub fn with_config(config: EngineConfig) -> Self {
    let storage = Storage::memory();

    let mut endpoints = BTreeMap::new();
    endpoints.insert("dahlia/import".to_string(), Url::parse(IMPORT_URL).unwrap());
    endpoints.insert("dahlia/export".to_string(), Url::parse(EXPORT_URL).unwrap());
    let runtime = Arc::new(ExternalRuntime::new(storage.substorage("runtime"), endpoints));

    let importer = MockTool::new(
      IMPORT_URL,
      json!({
        "actions": {
          "create": {"parameters": {"source": {"type": "url"}}},
          "refresh": {},
        },
      }),
    );
    let exporter = MockTool::new(
      EXPORT_URL,
      json!({
        "data_format": "onnx",
        "actions": {
          "export": {
            "parameters": {
              "input": {"type": "url"},
              "epochs": {"type": "plain-object"},
            },
          },
        },
      }),
    );

    let executor = Self::build_executor(&storage, &runtime, &importer, &exporter, config);
    Self {
      storage,
      runtime,
      importer,
      exporter,
      executor,
    }
  }

  fn build_executor(
    storage: &Storage,
    runtime: &Arc<ExternalRuntime>,
    importer: &Arc<MockTool>,
    exporter: &Arc<MockTool>,
    config: EngineConfig,
  ) -> Executor {
    let mut runtimes = RuntimeRegistry::new();
    runtimes.register("external", runtime.clone());

    let mut tools = HashMap::new();
    tools.insert(IMPORT_URL.to_string(), importer.clone());
    tools.insert(EXPORT_URL.to_string(), exporter.clone());

    Executor::new(
      storage.substorage("executions"),
      runtimes,
      Arc::new(MockConnector { tools }),
    )
    .with_config(config)
  }

  /// A second executor over the same state, as after a process restart.
  pub fn restarted(&self) -> Executor {
    Self::build_executor(
      &self.storage,
      &self.runtime,
      &self.importer,
      &self.exporter,
      fast_config(),
    )
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.executor = self.executor.with_notifier(notifier);
    self
  }

  pub fn request(&self, name: &str, workflow: WorkflowDef) -> NewExecution {
    let mut config = SimpleExecutionConfig::new(Url::parse(RUNTIME_URL).unwrap());
    config
      .environment
      .insert("DATA_ROOT".to_string(), "/data".to_string());
    let mut request = NewExecution::new(name, workflow, config);
    request.arguments.insert(
      "dataset".to_string(),
      Value::from("http://data.local/set.csv"),
    );
    request
  }

  pub async fn create(&self, name: &str) -> Execution {
    self
      .executor
      .create_execution(self.request(name, scenario()))
      .await
      .unwrap()
  }

  /// Overwrite a raw field of an execution's records.
  pub async fn write(&self, path: &str, value: &str) {
    self
      .storage
      .substorage("executions")
      .write(path, value.to_string())
      .await
      .unwrap();
  }

  /// Delete raw records of an execution, as a crash mid-update would leave them.
  pub async fn remove(&self, path: &str) {
    self
      .storage
      .substorage("executions")
      .delete(path)
      .await
      .unwrap();
  }

  pub async fn read(&self, path: &str) -> String {
    let data = self
      .storage
      .substorage("executions")
      .read(path)
      .await
      .unwrap();
    String::from_utf8(data.to_vec()).unwrap()
  }
}
