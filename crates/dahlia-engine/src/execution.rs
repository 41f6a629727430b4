use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dahlia_config::{AssignmentSource, ConfigError, StepDef, WorkerDef, WorkflowDef};
use dahlia_expression::{ArtifactPart, Expression, artifact_url, join_url};
use dahlia_runtime::{
  Application, Image, ImageConfig, Instance, InstanceConfig, InstanceRef, InstanceStatus,
};
use dahlia_storage::Storage;
use dahlia_storage::stored::StoredNamedObjectMap;
use dahlia_tool::{ArtifactStatus, CreateArtifact, Tool, ToolError};
use dahlia_value::{ArchiveValue, Value};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::SimpleExecutionConfig;
use crate::context::Scope;
use crate::error::EngineError;
use crate::events::ExecutionEvent;
use crate::executor::Services;
use crate::records::{ExecutionRecord, SourceRecord, StepRecord, WorkerRecord};
use crate::status::{ExecutionStatus, OutputStatus, StepStatus, WorkerStatus};

/// Prefix of argument addresses that point into a source's instance.
pub const SOURCE_SCHEME: &str = "source://";

/// Which artifact [`Execution::save_artifact`] downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSelector {
  /// The artifact an output is currently assigned to.
  Output(String),
  /// The artifact a step produces, by step name or index.
  Step(String),
  Worker { worker: String, artifact: String },
}

enum StepOutcome {
  Completed,
  Suspended,
}

#[derive(Debug, PartialEq, Eq)]
enum Resume {
  /// The remote artifact finished while nobody was watching.
  Finished,
  Poll,
  Recreate,
}

/// One durable run of a workflow.
///
/// All state lives in storage; this handle only knows where. Dropping it,
/// or the whole process, at any point leaves a record that
/// [`execute`](Self::execute) can pick up again.
#[derive(Clone)]
pub struct Execution {
  name: String,
  pub(crate) record: ExecutionRecord,
  pub(crate) services: Arc<Services>,
}

impl Execution {
  pub(crate) fn new(name: String, record: ExecutionRecord, services: Arc<Services>) -> Self {
    Self {
      name,
      record,
      services,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub async fn status(&self) -> Result<ExecutionStatus, EngineError> {
    Ok(self.record.status().require().await?)
  }

  pub async fn workflow(&self) -> Result<WorkflowDef, EngineError> {
    Ok(self.record.workflow().require().await?)
  }

  pub async fn config(&self) -> Result<SimpleExecutionConfig, EngineError> {
    Ok(self.record.config().require().await?)
  }

  pub async fn created_at(&self) -> Result<DateTime<Utc>, EngineError> {
    Ok(self.record.created_at().require().await?)
  }

  /// Index of the step being run, or last run.
  pub async fn current_step(&self) -> Result<Option<usize>, EngineError> {
    Ok(self.record.current_step().get().await?)
  }

  pub async fn step_statuses(&self) -> Result<Vec<StepStatus>, EngineError> {
    let mut statuses = Vec::new();
    for step in self.record.steps().all().await? {
      statuses.push(step.status().get_or(StepStatus::Pending).await?);
    }
    Ok(statuses)
  }

  pub(crate) fn notify(&self, event: ExecutionEvent) {
    self.services.notifier.notify(event);
  }

  pub(crate) fn invalid_state(&self, status: ExecutionStatus, operation: &'static str) -> EngineError {
    EngineError::InvalidState {
      execution: self.name.clone(),
      status,
      operation,
    }
  }

  /// The runtime application owning this execution's instances.
  pub(crate) async fn application(&self) -> Result<Arc<dyn Application>, EngineError> {
    let config = self.config().await?;
    let name = self.record.application().require().await?;
    let runtime = self.services.runtimes.resolve(&config.runtime_url)?;
    runtime
      .get_application(&name)
      .await?
      .ok_or_else(|| EngineError::OrphanedExecution(self.name.clone()))
  }

  /// Run steps until the workflow completes, suspends at a wait step, or a
  /// step fails.
  ///
  /// Completed steps are skipped, so calling this again after a crash or a
  /// suspension continues where the last call stopped. A completed execution
  /// is left untouched. A step whose remote action fails leaves the
  /// execution `failed` and returns `Ok(Failed)`; every other error is also
  /// recorded and then returned.
  #[instrument(name = "execution_execute", skip(self), fields(execution = %self.name))]
  pub async fn execute(&self) -> Result<ExecutionStatus, EngineError> {
    match self.status().await? {
      ExecutionStatus::Completed => {
        debug!(execution = %self.name, "execution already completed");
        return Ok(ExecutionStatus::Completed);
      }
      ExecutionStatus::Failed => {
        return Err(self.invalid_state(ExecutionStatus::Failed, "execute"));
      }
      _ => {}
    }

    let workflow = self.workflow().await?;
    workflow.validate()?;
    let application = self.application().await?;

    self.record.status().set(&ExecutionStatus::InProgress).await?;
    info!(execution = %self.name, "execution_started");
    self.notify(ExecutionEvent::ExecutionStarted {
      execution: self.name.clone(),
    });

    match self.run(&workflow, application.as_ref()).await {
      Ok(status) => Ok(status),
      Err(e) => {
        self.record.status().set(&ExecutionStatus::Failed).await?;
        error!(execution = %self.name, error = %e, "execution_failed");
        self.notify(ExecutionEvent::ExecutionFailed {
          execution: self.name.clone(),
          error: e.to_string(),
        });
        match e {
          EngineError::StepFailed { .. } => Ok(ExecutionStatus::Failed),
          other => Err(other),
        }
      }
    }
  }

  async fn run(
    &self,
    workflow: &WorkflowDef,
    application: &dyn Application,
  ) -> Result<ExecutionStatus, EngineError> {
    let steps = self.record.steps().all().await?;
    if steps.len() != workflow.steps.len() {
      return Err(EngineError::StepRecordsMismatch {
        execution: self.name.clone(),
        records: steps.len(),
        steps: workflow.steps.len(),
      });
    }
    self.ensure_workers(workflow, application).await?;
    self.ensure_sources(application).await?;

    for (index, step) in steps.iter().enumerate() {
      let status = step.status().get_or(StepStatus::Pending).await?;
      if status == StepStatus::Completed {
        continue;
      }
      let definition = workflow
        .steps
        .get(index)
        .ok_or_else(|| EngineError::StepNotFound(index.to_string()))?;
      self.record.current_step().set(&index).await?;

      match self.run_step(index, definition, step, status, workflow).await {
        Ok(StepOutcome::Completed) => {}
        Ok(StepOutcome::Suspended) => {
          self.record.status().set(&ExecutionStatus::Suspended).await?;
          info!(execution = %self.name, step = index, "execution_suspended");
          self.notify(ExecutionEvent::ExecutionSuspended {
            execution: self.name.clone(),
            step: index,
          });
          return Ok(ExecutionStatus::Suspended);
        }
        Err(e) => {
          step.status().set(&StepStatus::Failed).await?;
          step.error().set(&e.to_string()).await?;
          error!(execution = %self.name, step = index, error = %e, "step_failed");
          self.notify(ExecutionEvent::StepFailed {
            execution: self.name.clone(),
            step: index,
            error: e.to_string(),
          });
          return Err(e);
        }
      }
    }

    self.stop_instances(application).await?;
    self.record.status().set(&ExecutionStatus::Completed).await?;
    info!(execution = %self.name, "execution_completed");
    self.notify(ExecutionEvent::ExecutionCompleted {
      execution: self.name.clone(),
    });
    Ok(ExecutionStatus::Completed)
  }

  #[instrument(name = "step_execute", skip_all, fields(execution = %self.name, step = index))]
  async fn run_step(
    &self,
    index: usize,
    definition: &StepDef,
    record: &StepRecord,
    status: StepStatus,
    workflow: &WorkflowDef,
  ) -> Result<StepOutcome, EngineError> {
    if definition.wait {
      // First visit suspends, the next one completes.
      if status == StepStatus::Suspended {
        record.status().set(&StepStatus::Completed).await?;
        self.step_completed(index);
        return Ok(StepOutcome::Completed);
      }
      self.assign_outputs(index, definition, workflow).await?;
      record.status().set(&StepStatus::Suspended).await?;
      return Ok(StepOutcome::Suspended);
    }

    let label = definition.label(index);
    let (worker, artifact) = action_target(index, definition)?;
    info!(
      execution = %self.name,
      step = index,
      name = %label,
      %worker,
      %artifact,
      "step_started"
    );
    self.notify(ExecutionEvent::StepStarted {
      execution: self.name.clone(),
      step: index,
      name: label.clone(),
    });

    let tool = self.worker_tool(worker).await?;
    let resume = match status {
      StepStatus::InProgress => self.resume(tool.as_ref(), artifact).await?,
      _ => Resume::Recreate,
    };

    if resume == Resume::Recreate {
      let request = self.prepare(definition, artifact, workflow, tool.as_ref()).await?;
      tool.delete_artifact(artifact).await?;
      record.status().set(&StepStatus::InProgress).await?;
      let command_index = tool.create_artifact(&request).await?;
      record.command_index().set(&command_index).await?;
      debug!(
        execution = %self.name,
        step = index,
        %artifact,
        action = %request.action,
        command_index,
        "artifact requested"
      );
    }

    let outcome = match resume {
      Resume::Finished => ArtifactStatus::Completed,
      Resume::Poll | Resume::Recreate => self.poll(tool.as_ref(), &label, artifact).await?,
    };
    if outcome == ArtifactStatus::Failed {
      let command_index = record.command_index().get_or(0).await?;
      return Err(EngineError::StepFailed {
        step: label,
        source: ToolError::CommandFailed {
          artifact: artifact.to_string(),
          command_index,
        },
      });
    }

    self.assign_outputs(index, definition, workflow).await?;
    record.status().set(&StepStatus::Completed).await?;
    self.step_completed(index);
    Ok(StepOutcome::Completed)
  }

  fn step_completed(&self, index: usize) {
    info!(execution = %self.name, step = index, "step_completed");
    self.notify(ExecutionEvent::StepCompleted {
      execution: self.name.clone(),
      step: index,
    });
  }

  /// Decide how to continue a step that was in progress when the last run
  /// stopped.
  async fn resume(&self, tool: &dyn Tool, artifact: &str) -> Result<Resume, EngineError> {
    let resume = match tool.status(artifact).await {
      Ok(ArtifactStatus::Completed) => Resume::Finished,
      Ok(ArtifactStatus::Pending | ArtifactStatus::InProgress) => Resume::Poll,
      Ok(ArtifactStatus::Failed) | Err(ToolError::ArtifactNotFound(_)) => Resume::Recreate,
      Err(e) => return Err(e.into()),
    };
    info!(execution = %self.name, %artifact, ?resume, "resuming step");
    Ok(resume)
  }

  /// Evaluate a step's arguments into a create request.
  async fn prepare(
    &self,
    definition: &StepDef,
    artifact: &str,
    workflow: &WorkflowDef,
    tool: &dyn Tool,
  ) -> Result<CreateArtifact, EngineError> {
    let manifest = tool.manifest().await?;
    let (action, declaration) = manifest.action(definition.action.as_deref())?;
    let scope = Scope::new(self, workflow);

    let mut arguments = BTreeMap::new();
    for (name, raw) in &definition.arguments {
      let value = Expression::parse(raw)?.evaluate(&scope).await?;
      let value = self.resolve_source_address(value).await?;
      let value = match declaration.parameters.get(name) {
        Some(parameter) => value.convert_to(parameter.kind).await?,
        None => {
          warn!(execution = %self.name, argument = %name, %action, "argument not declared by tool");
          value
        }
      };
      arguments.insert(name.clone(), value);
    }

    Ok(CreateArtifact {
      artifact_name: artifact.to_string(),
      action: action.to_string(),
      arguments,
    })
  }

  /// Rewrite `source://NAME/path` into the URL of source `NAME`'s instance.
  async fn resolve_source_address(&self, value: Value) -> Result<Value, EngineError> {
    let Some((source, path)) = source_address(&value) else {
      return Ok(value);
    };
    let base = self.source_url(&source).await?;
    let url = join_url(&base, &path)?;
    debug!(execution = %self.name, %source, %url, "resolved source address");
    Ok(Value::Url(url))
  }

  /// Wait for `artifact` to reach a terminal status.
  ///
  /// Polls with exponential backoff and forwards a pending interrupt
  /// request to the tool once.
  async fn poll(
    &self,
    tool: &dyn Tool,
    step: &str,
    artifact: &str,
  ) -> Result<ArtifactStatus, EngineError> {
    let config = &self.services.config;
    let started = Instant::now();
    let mut interval = config.poll_initial_interval;

    loop {
      if self.record.interrupt_requested().get_or(false).await? {
        tool.interrupt(artifact).await?;
        self.record.interrupt_requested().set(&false).await?;
        info!(execution = %self.name, %step, %artifact, "interrupt_forwarded");
      }

      let status = tool.wait_for_complete(artifact).await?;
      if status.is_terminal() {
        return Ok(status);
      }
      if let Some(timeout) = config.poll_timeout
        && started.elapsed() >= timeout
      {
        return Err(EngineError::PollTimeout {
          step: step.to_string(),
          artifact: artifact.to_string(),
        });
      }

      debug!(%artifact, %status, ?interval, "artifact not finished");
      sleep(interval).await;
      interval = config.next_poll_interval(interval);
    }
  }

  async fn assign_outputs(
    &self,
    index: usize,
    definition: &StepDef,
    workflow: &WorkflowDef,
  ) -> Result<(), EngineError> {
    if let Some(output) = &definition.output {
      let (worker, artifact) = action_target(index, definition)?;
      self.assign_output(output, worker, artifact, index).await?;
    }

    for assignment in &definition.outputs {
      let (worker, artifact) = match &assignment.from {
        AssignmentSource::Step { step } => {
          let source = workflow
            .step_index(step)
            .ok_or_else(|| EngineError::StepNotFound(step.clone()))?;
          action_target(source, &workflow.steps[source])?
        }
        AssignmentSource::Artifact { worker, artifact } => (worker.as_str(), artifact.as_str()),
      };
      self
        .assign_output(&assignment.output, worker, artifact, index)
        .await?;
    }
    Ok(())
  }

  async fn assign_output(
    &self,
    output: &str,
    worker: &str,
    artifact: &str,
    step: usize,
  ) -> Result<(), EngineError> {
    let record = self.record.outputs().get_or_create(output).await?;
    record.worker().set(&worker.to_string()).await?;
    record.artifact().set(&artifact.to_string()).await?;
    record.step().set(&step).await?;
    record.status().set(&OutputStatus::Assigned).await?;
    info!(execution = %self.name, %output, %worker, %artifact, "output_assigned");
    Ok(())
  }

  async fn ensure_workers(
    &self,
    workflow: &WorkflowDef,
    application: &dyn Application,
  ) -> Result<(), EngineError> {
    let scope = Scope::new(self, workflow);
    for (name, definition) in &workflow.workers {
      let record = self.record.workers().get_or_create(name).await?;
      match record.status().get_or(WorkerStatus::Pending).await? {
        WorkerStatus::Created => {
          let reference = record.instance().require().await?;
          self.ensure_running(application, name, &reference).await?;
        }
        WorkerStatus::Pending => {
          self
            .create_worker(name, definition, &record, application, &scope)
            .await?
        }
      }
    }
    Ok(())
  }

  #[instrument(name = "worker_create", skip_all, fields(execution = %self.name, worker = %name))]
  async fn create_worker(
    &self,
    name: &str,
    definition: &WorkerDef,
    record: &WorkerRecord,
    application: &dyn Application,
    scope: &Scope<'_>,
  ) -> Result<(), EngineError> {
    let image = Expression::parse(&definition.image)?
      .evaluate(scope)
      .await?
      .as_string()
      .await?;
    let mut environment = BTreeMap::new();
    for (key, raw) in &definition.environment {
      let value = Expression::parse(raw)?.evaluate(scope).await?;
      environment.insert(key.clone(), value.as_string().await?);
    }

    let image = application.create_image(&ImageConfig { name: image }).await?;
    let mut config = InstanceConfig::new(image);
    config.environment = environment;
    let instance = self
      .replace_instance(application, &format!("worker-{}", name), &config)
      .await?;
    self.wait_for_tool(name, instance.url()).await?;

    record.instance().set(&instance.reference()).await?;
    record.status().set(&WorkerStatus::Created).await?;
    info!(execution = %self.name, worker = %name, url = %instance.url(), "worker_created");
    self.notify(ExecutionEvent::WorkerCreated {
      execution: self.name.clone(),
      worker: name.to_string(),
      url: instance.url().to_string(),
    });
    Ok(())
  }

  async fn ensure_sources(&self, application: &dyn Application) -> Result<(), EngineError> {
    let sources = self.record.sources();
    for name in sources.names().await? {
      let record = sources.get(&name).await?;
      match record.status().get_or(WorkerStatus::Pending).await? {
        WorkerStatus::Created => {
          let reference = record.instance().require().await?;
          self.ensure_running(application, &name, &reference).await?;
        }
        WorkerStatus::Pending => self.create_source(&name, &record, application).await?,
      }
    }
    Ok(())
  }

  /// Clone another execution's worker instance read-only.
  async fn create_source(
    &self,
    name: &str,
    record: &SourceRecord,
    application: &dyn Application,
  ) -> Result<(), EngineError> {
    let description = record.description().require().await?;
    let storage = match &description.executor {
      Some(location) => Storage::from_location(location)?,
      None => self.services.storage.clone(),
    };
    let origin = origin_instance(storage, &description.execution, &description.worker).await?;

    let mut config = InstanceConfig::new(Image {
      name: origin.image.clone(),
    });
    config.clone_of = Some(origin);
    config.read_only = true;
    let instance = self
      .replace_instance(application, &format!("source-{}", name), &config)
      .await?;
    self.wait_for_tool(name, instance.url()).await?;

    record.instance().set(&instance.reference()).await?;
    record.status().set(&WorkerStatus::Created).await?;
    info!(
      execution = %self.name,
      source = %name,
      origin = %description,
      url = %instance.url(),
      "source_created"
    );
    self.notify(ExecutionEvent::SourceCreated {
      execution: self.name.clone(),
      source: name.to_string(),
      url: instance.url().to_string(),
    });
    Ok(())
  }

  /// Create instance `name`, deleting a leftover of an interrupted attempt.
  async fn replace_instance(
    &self,
    application: &dyn Application,
    name: &str,
    config: &InstanceConfig,
  ) -> Result<Arc<dyn Instance>, EngineError> {
    if let Some(stale) = application.get_instance(name).await? {
      warn!(execution = %self.name, instance = %name, "deleting stale instance");
      stale.delete().await?;
    }
    Ok(application.create_instance(name, config).await?)
  }

  /// The live instance behind `reference`, started if it was stopped.
  pub(crate) async fn ensure_running(
    &self,
    application: &dyn Application,
    owner: &str,
    reference: &InstanceRef,
  ) -> Result<Arc<dyn Instance>, EngineError> {
    let instance = match application.get_instance(&reference.name).await? {
      Some(instance) => instance,
      None => return Err(self.instance_missing(owner)),
    };
    match instance.status().await? {
      InstanceStatus::Running => {}
      InstanceStatus::Stopped => {
        instance.start().await?;
        info!(execution = %self.name, instance = %reference.name, "instance_started");
      }
      InstanceStatus::Missing => return Err(self.instance_missing(owner)),
    }
    Ok(instance)
  }

  fn instance_missing(&self, owner: &str) -> EngineError {
    error!(execution = %self.name, %owner, "instance_missing");
    EngineError::InstanceMissing(owner.to_string())
  }

  /// Wait until the tool at `url` serves its manifest.
  async fn wait_for_tool(&self, owner: &str, url: &Url) -> Result<Arc<dyn Tool>, EngineError> {
    let config = &self.services.config;
    let tool = self.services.tools.connect(url)?;
    let started = Instant::now();
    loop {
      match tool.manifest().await {
        Ok(_) => return Ok(tool),
        Err(e) if started.elapsed() < config.tool_online_timeout => {
          debug!(%owner, %url, error = %e, "waiting for tool");
          sleep(config.tool_online_interval).await;
        }
        Err(e) => {
          error!(execution = %self.name, %owner, %url, error = %e, "tool_unavailable");
          return Err(EngineError::UnavailableTool {
            worker: owner.to_string(),
            url: url.to_string(),
          });
        }
      }
    }
  }

  async fn stop_instances(&self, application: &dyn Application) -> Result<(), EngineError> {
    let mut references = Vec::new();
    for worker in self.record.workers().all().await? {
      references.extend(worker.instance().get().await?);
    }
    for source in self.record.sources().all().await? {
      references.extend(source.instance().get().await?);
    }

    for reference in references {
      if let Some(instance) = application.get_instance(&reference.name).await?
        && instance.status().await? == InstanceStatus::Running
      {
        instance.stop().await?;
        debug!(execution = %self.name, instance = %reference.name, "instance stopped");
      }
    }
    Ok(())
  }

  /// Instance of a created worker.
  pub(crate) async fn worker_reference(&self, worker: &str) -> Result<InstanceRef, EngineError> {
    let not_found = || EngineError::WorkerNotFound(worker.to_string());
    let workers = self.record.workers();
    if !workers.contains(worker).await? {
      return Err(not_found());
    }
    let record = workers.get(worker).await?;
    if record.status().get_or(WorkerStatus::Pending).await? != WorkerStatus::Created {
      return Err(not_found());
    }
    record.instance().get().await?.ok_or_else(not_found)
  }

  pub(crate) async fn worker_tool(&self, worker: &str) -> Result<Arc<dyn Tool>, EngineError> {
    let reference = self.worker_reference(worker).await?;
    Ok(self.services.tools.connect(&reference.url)?)
  }

  async fn source_url(&self, source: &str) -> Result<Url, EngineError> {
    let not_found = || EngineError::SourceNotFound(source.to_string());
    let sources = self.record.sources();
    if !sources.contains(source).await? {
      return Err(not_found());
    }
    let record = sources.get(source).await?;
    if record.status().get_or(WorkerStatus::Pending).await? != WorkerStatus::Created {
      return Err(not_found());
    }
    Ok(record.instance().get().await?.ok_or_else(not_found)?.url)
  }

  /// Ask the running step's tool to stop its command.
  ///
  /// The flag is forwarded by the process running [`execute`](Self::execute)
  /// on its next poll.
  pub async fn request_interrupt(&self) -> Result<(), EngineError> {
    self.record.interrupt_requested().set(&true).await?;
    info!(execution = %self.name, "interrupt_requested");
    Ok(())
  }

  /// Log text of the last command run for `step` (a name or an index).
  pub async fn step_log(&self, step: &str) -> Result<String, EngineError> {
    let workflow = self.workflow().await?;
    let index = find_step(&workflow, step)?;
    let (worker, artifact) = action_target(index, &workflow.steps[index])?;
    let command_index = self
      .record
      .steps()
      .get(index)
      .await?
      .command_index()
      .get()
      .await?
      .ok_or_else(|| EngineError::NoCommand(step.to_string()))?;
    let tool = self.worker_tool(worker).await?;
    Ok(tool.log(artifact, command_index).await?)
  }

  /// Download an artifact's data into `dir`.
  pub async fn save_artifact(
    &self,
    selector: &ArtifactSelector,
    dir: &Path,
  ) -> Result<(), EngineError> {
    let (worker, artifact) = match selector {
      ArtifactSelector::Output(name) => {
        let outputs = self.record.outputs();
        if !outputs.contains(name).await? {
          return Err(EngineError::OutputNotFound(name.clone()));
        }
        let record = outputs.get(name).await?;
        if record.status().get_or(OutputStatus::Pending).await? != OutputStatus::Assigned {
          return Err(EngineError::OutputUnassigned(name.clone()));
        }
        (record.worker().require().await?, record.artifact().require().await?)
      }
      ArtifactSelector::Step(step) => {
        let workflow = self.workflow().await?;
        let index = find_step(&workflow, step)?;
        let (worker, artifact) = action_target(index, &workflow.steps[index])?;
        (worker.to_string(), artifact.to_string())
      }
      ArtifactSelector::Worker { worker, artifact } => (worker.clone(), artifact.clone()),
    };

    let reference = self.worker_reference(&worker).await?;
    let application = self.application().await?;
    self
      .ensure_running(application.as_ref(), &worker, &reference)
      .await?;

    let url = artifact_url(&reference.url, &artifact, ArtifactPart::Data, None)?;
    ArchiveValue::from_url(url)?.extract_to(dir).await?;
    info!(
      execution = %self.name,
      %worker,
      %artifact,
      dir = %dir.display(),
      "artifact_saved"
    );
    Ok(())
  }
}

/// Worker and artifact of an action step.
pub(crate) fn action_target(index: usize, step: &StepDef) -> Result<(&str, &str), EngineError> {
  match (step.worker.as_deref(), step.artifact.as_deref()) {
    (Some(worker), Some(artifact)) if !step.wait => Ok((worker, artifact)),
    _ => Err(EngineError::Config(ConfigError::InvalidStep {
      index,
      message: "not an action step".to_string(),
    })),
  }
}

/// Index of the step called `step`, or with index `step`.
pub(crate) fn find_step(workflow: &WorkflowDef, step: &str) -> Result<usize, EngineError> {
  let index = match step.parse::<usize>() {
    Ok(index) => Some(index).filter(|index| *index < workflow.steps.len()),
    Err(_) => workflow.step_index(step),
  };
  index.ok_or_else(|| EngineError::StepNotFound(step.to_string()))
}

/// Split a `source://NAME/path` address.
pub(crate) fn source_address(value: &Value) -> Option<(String, String)> {
  let address = match value {
    Value::String(s) | Value::PlainObject(serde_json::Value::String(s)) => s.as_str(),
    Value::Url(url) => url.as_str(),
    _ => return None,
  };
  let rest = address.strip_prefix(SOURCE_SCHEME)?;
  let (source, path) = rest.split_once('/').unwrap_or((rest, ""));
  Some((source.to_string(), path.to_string()))
}

/// Instance of `worker` in another executor's execution.
async fn origin_instance(
  storage: Storage,
  execution: &str,
  worker: &str,
) -> Result<InstanceRef, EngineError> {
  let executions = StoredNamedObjectMap::<ExecutionRecord>::new(storage);
  if !executions.contains(execution).await? {
    return Err(EngineError::ExecutionNotFound(execution.to_string()));
  }
  let workers = executions.get(execution).await?.workers();
  let not_found = || EngineError::WorkerNotFound(format!("{}:{}", execution, worker));
  if !workers.contains(worker).await? {
    return Err(not_found());
  }
  workers
    .get(worker)
    .await?
    .instance()
    .get()
    .await?
    .ok_or_else(not_found)
}
