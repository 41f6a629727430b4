use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use dahlia_config::WorkflowDef;
use dahlia_tool::ToolError;
use dahlia_value::store_value;
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::execution::{Execution, action_target};
use crate::executor::bind_arguments;
use crate::status::{ExecutionStatus, OutputStatus, StepStatus, WorkerStatus};

/// How to restart a failed execution.
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
  /// Restart at this step index instead of the first one not completed.
  /// Every earlier step must be completed.
  pub step: Option<usize>,
  /// Replacement workflow. Its steps from the restart index on replace the
  /// stored ones; earlier steps are kept as they ran.
  pub workflow: Option<WorkflowDef>,
  /// Replacement context entries.
  pub context: Option<BTreeMap<String, Bytes>>,
  /// Workers whose instances are destroyed and created again.
  pub recreate_workers: Vec<String>,
}

impl Execution {
  /// Restart a failed execution and run it.
  ///
  /// Everything is checked before any record changes. Then every artifact
  /// produced from the restart index onward is deleted, the step records
  /// from that index are reset, and [`execute`](Self::execute) runs. Steps
  /// before the restart index never run again.
  #[instrument(name = "execution_retry", skip(self, options), fields(execution = %self.name()))]
  pub async fn retry(&self, options: RetryOptions) -> Result<ExecutionStatus, EngineError> {
    let status = self.status().await?;
    if status != ExecutionStatus::Failed {
      return Err(self.invalid_state(status, "retry"));
    }

    let current = self.workflow().await?;
    let statuses = self.step_statuses().await?;
    let first_incomplete = statuses
      .iter()
      .position(|status| *status != StepStatus::Completed)
      .unwrap_or(statuses.len());

    let restart = match options.step {
      None => first_incomplete,
      Some(step) if step >= current.steps.len() => {
        return Err(EngineError::InvalidRetry(format!(
          "step {} is out of range, the execution has {} steps",
          step,
          current.steps.len()
        )));
      }
      Some(step) if step > first_incomplete => {
        return Err(EngineError::InvalidRetry(format!(
          "step {} has not completed, cannot restart at step {}",
          first_incomplete, step
        )));
      }
      Some(step) => step,
    };

    let workflow = match options.workflow {
      Some(replacement) => {
        let mut steps = current.steps[..restart].to_vec();
        steps.extend(replacement.steps.into_iter().skip(restart));
        WorkflowDef {
          steps,
          ..replacement
        }
      }
      None => current.clone(),
    };
    workflow.validate()?;

    for worker in &options.recreate_workers {
      if !workflow.workers.contains_key(worker) {
        return Err(EngineError::WorkerNotFound(worker.clone()));
      }
    }

    let mut unbound = BTreeMap::new();
    for name in workflow.parameters.keys() {
      if !self.record.argument(name).exists("kind").await? {
        unbound.insert(name.clone(), workflow.parameters[name].clone());
      }
    }
    let defaults = bind_arguments(
      &WorkflowDef {
        parameters: unbound,
        ..WorkflowDef::default()
      },
      BTreeMap::new(),
    )
    .await?;

    let application = self.application().await?;

    // Nothing has been written up to here.
    info!(execution = %self.name(), restart, "execution_retry_started");

    self.clean_artifacts(&current, restart).await?;

    if let Some(context) = options.context {
      let storage = self.record.context();
      storage.delete("").await?;
      for (entry, data) in context {
        storage.write(&entry, data).await?;
      }
    }

    self.record.workflow().set(&workflow).await?;
    for (name, value) in &defaults {
      store_value(&self.record.argument(name), value).await?;
    }

    let recreate: BTreeSet<&String> = options.recreate_workers.iter().collect();
    for name in workflow.workers.keys() {
      let record = self.record.workers().get_or_create(name).await?;
      if recreate.contains(name) {
        if let Some(reference) = record.instance().get().await?
          && let Some(instance) = application.get_instance(&reference.name).await?
        {
          instance.delete().await?;
        }
        record.instance().unset().await?;
        record.status().set(&WorkerStatus::Pending).await?;
        info!(execution = %self.name(), worker = %name, "worker_reset");
      } else if record.status().get().await?.is_none() {
        record.status().set(&WorkerStatus::Pending).await?;
      }
    }

    // Reset in place so an interrupted retry leaves every record it has not
    // reached yet and can simply be retried again.
    let steps = self.record.steps();
    steps.truncate(workflow.steps.len()).await?;
    let existing = steps.count().await?;
    for (index, step) in workflow.steps.iter().enumerate().skip(restart) {
      let record = if index < existing {
        steps.get(index).await?
      } else {
        steps.push().await?.1
      };
      record.reset(step.name.as_ref()).await?;
    }

    let outputs = self.record.outputs();
    for name in outputs.names().await? {
      let record = outputs.get(&name).await?;
      if let Some(step) = record.step().get().await?
        && step >= restart
      {
        record.clear().await?;
      }
    }
    for (name, definition) in &workflow.outputs {
      if !outputs.contains(name).await? {
        let record = outputs.create(name).await?;
        record.status().set(&OutputStatus::Pending).await?;
      }
      outputs
        .get(name)
        .await?
        .label()
        .set(&definition.label)
        .await?;
    }

    self.record.interrupt_requested().set(&false).await?;
    self.record.status().set(&ExecutionStatus::Pending).await?;
    info!(execution = %self.name(), restart, "execution_retried");

    self.execute().await
  }

  /// Delete the remote artifacts of steps `restart..` that have run.
  async fn clean_artifacts(&self, workflow: &WorkflowDef, restart: usize) -> Result<(), EngineError> {
    let steps = self.record.steps();
    let count = steps.count().await?;
    for (index, step) in workflow.steps.iter().enumerate().take(count).skip(restart) {
      if step.wait {
        continue;
      }
      let record = steps.get(index).await?;
      if record.status().get_or(StepStatus::Pending).await? == StepStatus::Pending {
        continue;
      }
      let (worker, artifact) = action_target(index, step)?;
      let tool = match self.worker_tool(worker).await {
        Ok(tool) => tool,
        Err(EngineError::WorkerNotFound(_)) => continue,
        Err(e) => return Err(e),
      };
      match tool.delete_artifact(artifact).await {
        Ok(()) => info!(execution = %self.name(), step = index, %artifact, "artifact_deleted"),
        Err(e @ ToolError::Http(_)) => {
          warn!(execution = %self.name(), %worker, %artifact, error = %e, "cannot reach tool to delete artifact");
        }
        Err(e) => return Err(e.into()),
      }
    }
    Ok(())
  }
}
