use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::error::EngineError;
use crate::execution::Execution;
use crate::status::{ExecutionStatus, OutputStatus, StepStatus, WorkerStatus};

/// Durable state of an execution, as shown by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
  pub name: String,
  pub status: ExecutionStatus,
  pub created_at: DateTime<Utc>,
  pub current_step: Option<usize>,
  pub steps: Vec<StepSummary>,
  pub workers: Vec<InstanceSummary>,
  pub sources: Vec<InstanceSummary>,
  pub outputs: Vec<OutputSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
  pub index: usize,
  pub name: Option<String>,
  pub status: StepStatus,
  pub wait: bool,
  pub worker: Option<String>,
  pub artifact: Option<String>,
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
  pub name: String,
  pub status: WorkerStatus,
  pub url: Option<Url>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSummary {
  pub name: String,
  pub label: String,
  pub status: OutputStatus,
  pub worker: Option<String>,
  pub artifact: Option<String>,
}

impl Execution {
  pub async fn summary(&self) -> Result<ExecutionSummary, EngineError> {
    let workflow = self.workflow().await?;

    let mut steps = Vec::new();
    for (index, record) in self.record.steps().all().await?.into_iter().enumerate() {
      let definition = workflow.steps.get(index);
      steps.push(StepSummary {
        index,
        name: record.name().get().await?,
        status: record.status().get_or(StepStatus::Pending).await?,
        wait: definition.is_some_and(|step| step.wait),
        worker: definition.and_then(|step| step.worker.clone()),
        artifact: definition.and_then(|step| step.artifact.clone()),
        error: record.error().get().await?,
      });
    }

    let mut workers = Vec::new();
    let worker_records = self.record.workers();
    for name in worker_records.names().await? {
      let record = worker_records.get(&name).await?;
      workers.push(InstanceSummary {
        status: record.status().get_or(WorkerStatus::Pending).await?,
        url: record.instance().get().await?.map(|instance| instance.url),
        name,
      });
    }

    let mut sources = Vec::new();
    let source_records = self.record.sources();
    for name in source_records.names().await? {
      let record = source_records.get(&name).await?;
      sources.push(InstanceSummary {
        status: record.status().get_or(WorkerStatus::Pending).await?,
        url: record.instance().get().await?.map(|instance| instance.url),
        name,
      });
    }

    let mut outputs = Vec::new();
    let output_records = self.record.outputs();
    for name in output_records.names().await? {
      let record = output_records.get(&name).await?;
      outputs.push(OutputSummary {
        label: record.label().get_or(String::new()).await?,
        status: record.status().get_or(OutputStatus::Pending).await?,
        worker: record.worker().get().await?,
        artifact: record.artifact().get().await?,
        name,
      });
    }

    Ok(ExecutionSummary {
      name: self.name().to_string(),
      status: self.status().await?,
      created_at: self.created_at().await?,
      current_step: self.current_step().await?,
      steps,
      workers,
      sources,
      outputs,
    })
  }
}
