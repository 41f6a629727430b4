use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use dahlia_config::{SourceDef, WorkflowDef};
use dahlia_runtime::RuntimeRegistry;
use dahlia_storage::Storage;
use dahlia_storage::stored::{StoredError, StoredNamedObjectMap};
use dahlia_tool::ToolConnector;
use dahlia_value::{Value, store_value};
use tracing::{info, instrument, warn};

use crate::config::{EngineConfig, SimpleExecutionConfig};
use crate::error::EngineError;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::execution::{Execution, source_address};
use crate::records::ExecutionRecord;
use crate::status::{ExecutionStatus, OutputStatus, WorkerStatus};

/// Everything an execution needs besides its own records.
#[derive(Clone)]
pub(crate) struct Services {
  pub(crate) storage: Storage,
  pub(crate) runtimes: RuntimeRegistry,
  pub(crate) tools: Arc<dyn ToolConnector>,
  pub(crate) notifier: Arc<dyn ExecutionNotifier>,
  pub(crate) config: EngineConfig,
}

/// Request to create an execution.
#[derive(Debug, Clone)]
pub struct NewExecution {
  pub name: String,
  pub workflow: WorkflowDef,
  /// Values for workflow parameters, by parameter name.
  pub arguments: BTreeMap<String, Value>,
  /// Named files readable by `workflow-context-file` expressions.
  pub context: BTreeMap<String, Bytes>,
  pub config: SimpleExecutionConfig,
  /// Workers of other executions, by the name this execution uses for them.
  pub sources: BTreeMap<String, SourceDef>,
}

impl NewExecution {
  pub fn new(name: impl Into<String>, workflow: WorkflowDef, config: SimpleExecutionConfig) -> Self {
    Self {
      name: name.into(),
      workflow,
      arguments: BTreeMap::new(),
      context: BTreeMap::new(),
      config,
      sources: BTreeMap::new(),
    }
  }
}

/// Creates and finds executions stored under one storage root.
///
/// Every execution lives in the directory named after it. Nothing is cached
/// in memory, so two executors over the same storage see the same state.
#[derive(Clone)]
pub struct Executor {
  services: Arc<Services>,
}

impl Executor {
  pub fn new(storage: Storage, runtimes: RuntimeRegistry, tools: Arc<dyn ToolConnector>) -> Self {
    Self {
      services: Arc::new(Services {
        storage,
        runtimes,
        tools,
        notifier: Arc::new(NoopNotifier),
        config: EngineConfig::default(),
      }),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    Arc::make_mut(&mut self.services).notifier = notifier;
    self
  }

  pub fn with_config(mut self, config: EngineConfig) -> Self {
    Arc::make_mut(&mut self.services).config = config;
    self
  }

  fn records(&self) -> StoredNamedObjectMap<ExecutionRecord> {
    StoredNamedObjectMap::new(self.services.storage.clone())
  }

  /// Create an execution in state `pending`.
  ///
  /// The name, the workflow and the arguments are all checked before the
  /// runtime application is created or anything is written. Leftovers of a
  /// creation that never finished are replaced, and a creation that fails
  /// part way removes what it wrote.
  #[instrument(name = "execution_create", skip(self, request), fields(execution = %request.name))]
  pub async fn create_execution(&self, request: NewExecution) -> Result<Execution, EngineError> {
    let NewExecution {
      name,
      workflow,
      arguments,
      context,
      config,
      sources,
    } = request;

    validate_name(&name)?;
    let records = self.records();
    if records.contains(&name).await? {
      if records.get(&name).await?.is_complete().await? {
        return Err(EngineError::ExecutionAlreadyExists(name));
      }
      warn!(execution = %name, "removing incomplete execution");
      records.remove(&name).await?;
    }
    workflow.validate()?;
    let arguments = bind_arguments(&workflow, arguments).await?;
    let runtime = self.services.runtimes.resolve(&config.runtime_url)?;

    // No complete record owns an application of this name.
    if let Some(stale) = runtime.get_application(&name).await? {
      warn!(execution = %name, "removing application of incomplete execution");
      stale.delete().await?;
    }
    let application = runtime.create_application(&name, &config.application).await?;

    let created = match records.create(&name).await {
      Ok(record) => {
        let written = NewRecord {
          record: &record,
          application: application.name(),
          workflow: &workflow,
          arguments: &arguments,
          context,
          config: &config,
          sources: &sources,
        }
        .write()
        .await;
        written.map(|()| record)
      }
      Err(e) => Err(e.into()),
    };
    let record = match created {
      Ok(record) => record,
      Err(e) => {
        warn!(execution = %name, error = %e, "execution_create_failed");
        if let Err(cleanup) = records.remove(&name).await {
          warn!(execution = %name, error = %cleanup, "cannot remove incomplete execution");
        }
        if let Err(cleanup) = application.delete().await {
          warn!(execution = %name, error = %cleanup, "cannot delete application");
        }
        return Err(e);
      }
    };

    info!(
      execution = %name,
      steps = workflow.steps.len(),
      workers = workflow.workers.len(),
      "execution_created"
    );
    Ok(Execution::new(name, record, self.services.clone()))
  }

  pub async fn execution(&self, name: &str) -> Result<Execution, EngineError> {
    let records = self.records();
    if !records.contains(name).await? {
      return Err(EngineError::ExecutionNotFound(name.to_string()));
    }
    let record = records.get(name).await?;
    Ok(Execution::new(name.to_string(), record, self.services.clone()))
  }

  /// Names of all stored executions, sorted.
  pub async fn names(&self) -> Result<Vec<String>, EngineError> {
    Ok(self.records().names().await?)
  }

  /// Delete an execution's application and records.
  pub async fn delete_execution(&self, name: &str) -> Result<(), EngineError> {
    let execution = self.execution(name).await?;
    match execution.application().await {
      Ok(application) => application.delete().await?,
      Err(EngineError::OrphanedExecution(_)) => {
        warn!(execution = %name, "deleting execution without application");
      }
      Err(EngineError::Stored(StoredError::MissingRequired(key))) => {
        warn!(execution = %name, %key, "deleting incomplete execution");
      }
      Err(e) => return Err(e),
    }
    self.records().remove(name).await?;
    info!(execution = %name, "execution_deleted");
    Ok(())
  }
}

/// Everything [`Executor::create_execution`] writes below a new record.
struct NewRecord<'a> {
  record: &'a ExecutionRecord,
  application: &'a str,
  workflow: &'a WorkflowDef,
  arguments: &'a BTreeMap<String, Value>,
  context: BTreeMap<String, Bytes>,
  config: &'a SimpleExecutionConfig,
  sources: &'a BTreeMap<String, SourceDef>,
}

impl NewRecord<'_> {
  async fn write(self) -> Result<(), EngineError> {
    let record = self.record;
    record.created_at().set(&Utc::now()).await?;
    record.application().set(&self.application.to_string()).await?;
    record.config().set(self.config).await?;
    record.workflow().set(self.workflow).await?;
    record.interrupt_requested().set(&false).await?;

    for (parameter, value) in self.arguments {
      store_value(&record.argument(parameter), value).await?;
    }
    let context_storage = record.context();
    for (entry, data) in self.context {
      context_storage.write(&entry, data).await?;
    }

    let steps = record.steps();
    for step in &self.workflow.steps {
      let (_, step_record) = steps.push().await?;
      step_record.reset(step.name.as_ref()).await?;
    }
    for worker in self.workflow.workers.keys() {
      let worker_record = record.workers().create(worker).await?;
      worker_record.status().set(&WorkerStatus::Pending).await?;
    }
    for (source, description) in self.sources {
      let source_record = record.sources().create(source).await?;
      source_record.description().set(description).await?;
      source_record.status().set(&WorkerStatus::Pending).await?;
    }
    for (output, definition) in &self.workflow.outputs {
      let output_record = record.outputs().create(output).await?;
      output_record.label().set(&definition.label).await?;
      output_record.status().set(&OutputStatus::Pending).await?;
    }
    // Written last: a record with a status is complete.
    record.status().set(&ExecutionStatus::Pending).await?;
    Ok(())
  }
}

fn validate_name(name: &str) -> Result<(), EngineError> {
  let valid = !name.is_empty()
    && !name.starts_with('.')
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
  if valid {
    Ok(())
  } else {
    Err(EngineError::InvalidName(name.to_string()))
  }
}

/// Match `arguments` against the declared parameters.
///
/// Defaults fill the gaps and every value is converted to its parameter's
/// declared kind, except `source://` addresses which are kept as written.
pub(crate) async fn bind_arguments(
  workflow: &WorkflowDef,
  mut arguments: BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, EngineError> {
  if let Some(unknown) = arguments
    .keys()
    .find(|name| !workflow.parameters.contains_key(*name))
  {
    return Err(EngineError::UnknownParameter(unknown.clone()));
  }

  let mut bound = BTreeMap::new();
  for (name, parameter) in &workflow.parameters {
    let value = match (arguments.remove(name), &parameter.default) {
      (Some(value), _) => value,
      (None, Some(default)) => Value::PlainObject(default.clone()),
      (None, None) => return Err(EngineError::MissingArgument(name.clone())),
    };
    // Source addresses only resolve once the step runs.
    let value = match parameter.kind {
      Some(kind) if source_address(&value).is_none() => value.convert_to(kind).await?,
      _ => value,
    };
    bound.insert(name.clone(), value);
  }
  Ok(bound)
}
