use async_trait::async_trait;
use dahlia_config::WorkflowDef;
use dahlia_expression::{EvaluationContext, ExpressionError};
use dahlia_tool::ToolError;
use dahlia_value::{ResourceValue, Value, load_value};
use url::Url;

use crate::error::EngineError;
use crate::execution::{Execution, action_target};

/// What expressions of one execution can see.
///
/// Every lookup reads the execution's records again, so a worker that was
/// recreated since the last evaluation resolves to its new instance.
pub(crate) struct Scope<'a> {
  execution: &'a Execution,
  workflow: &'a WorkflowDef,
}

impl<'a> Scope<'a> {
  pub(crate) fn new(execution: &'a Execution, workflow: &'a WorkflowDef) -> Self {
    Self {
      execution,
      workflow,
    }
  }
}

#[async_trait]
impl EvaluationContext for Scope<'_> {
  async fn parameter(&self, name: &str) -> Result<Value, ExpressionError> {
    if !self.workflow.parameters.contains_key(name) {
      return Err(ExpressionError::ParameterNotFound(name.to_string()));
    }
    Ok(load_value(&self.execution.record.argument(name)).await?)
  }

  async fn context_file(&self, name: &str) -> Result<ResourceValue, ExpressionError> {
    let context = self.execution.record.context();
    let found = context
      .exists(name)
      .await
      .map_err(|e| EngineError::from(e).into_expression())?;
    if !found {
      return Err(ExpressionError::ContextFileNotFound(name.to_string()));
    }
    Ok(ResourceValue::from_storage(context, name))
  }

  async fn environment(&self, name: &str) -> Result<Option<String>, ExpressionError> {
    let config = self
      .execution
      .config()
      .await
      .map_err(EngineError::into_expression)?;
    Ok(config.environment.get(name).cloned())
  }

  async fn step_artifact(&self, step: &str) -> Result<(String, String), ExpressionError> {
    let index = self
      .workflow
      .step_index(step)
      .ok_or_else(|| ExpressionError::StepNotFound(step.to_string()))?;
    let (worker, artifact) = action_target(index, &self.workflow.steps[index])
      .map_err(|_| ExpressionError::StepNotFound(step.to_string()))?;
    Ok((worker.to_string(), artifact.to_string()))
  }

  async fn worker_url(&self, worker: &str) -> Result<Url, ExpressionError> {
    match self.execution.worker_reference(worker).await {
      Ok(reference) => Ok(reference.url),
      Err(EngineError::WorkerNotFound(name)) => Err(ExpressionError::WorkerNotFound(name)),
      Err(e) => Err(e.into_expression()),
    }
  }

  async fn ensure_artifact(&self, worker: &str, artifact: &str) -> Result<(), ExpressionError> {
    let tool = match self.execution.worker_tool(worker).await {
      Ok(tool) => tool,
      Err(EngineError::WorkerNotFound(name)) => return Err(ExpressionError::WorkerNotFound(name)),
      Err(e) => return Err(e.into_expression()),
    };
    match tool.status(artifact).await {
      Ok(_) => Ok(()),
      Err(ToolError::ArtifactNotFound(_)) => Err(ExpressionError::ArtifactNotFound {
        worker: worker.to_string(),
        artifact: artifact.to_string(),
      }),
      Err(e) => Err(EngineError::from(e).into_expression()),
    }
  }
}
