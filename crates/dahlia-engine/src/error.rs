//! Error types for workflow execution.

use dahlia_config::ConfigError;
use dahlia_expression::ExpressionError;
use dahlia_runtime::RuntimeError;
use dahlia_storage::StorageError;
use dahlia_storage::stored::StoredError;
use dahlia_tool::ToolError;
use dahlia_value::ValueError;
use thiserror::Error;

use crate::status::ExecutionStatus;

/// Errors that can occur while creating, running or retrying executions.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("execution already exists: {0}")]
  ExecutionAlreadyExists(String),

  #[error("execution not found: {0}")]
  ExecutionNotFound(String),

  #[error("invalid execution name {0:?}: use letters, digits, '-', '_' or '.'")]
  InvalidName(String),

  /// A step's remote action did not complete successfully.
  #[error("step {step} failed: {source}")]
  StepFailed {
    step: String,
    #[source]
    source: ToolError,
  },

  /// The application backing an execution cannot be found.
  #[error("execution {0} has no application in its runtime")]
  OrphanedExecution(String),

  /// A newly created instance never answered its manifest.
  #[error("tool of {worker} at {url} did not come online")]
  UnavailableTool { worker: String, url: String },

  /// A created worker or source lost its instance.
  #[error("instance of {0} is missing")]
  InstanceMissing(String),

  #[error("step {step} timed out waiting for artifact {artifact}")]
  PollTimeout { step: String, artifact: String },

  #[error("cannot {operation} execution {execution} in state {status}")]
  InvalidState {
    execution: String,
    status: ExecutionStatus,
    operation: &'static str,
  },

  /// The step records do not line up with the stored workflow.
  #[error("execution {execution} has {records} step records for {steps} steps")]
  StepRecordsMismatch {
    execution: String,
    records: usize,
    steps: usize,
  },

  #[error("invalid retry: {0}")]
  InvalidRetry(String),

  #[error("no argument for workflow parameter {0}")]
  MissingArgument(String),

  #[error("argument for undeclared workflow parameter {0}")]
  UnknownParameter(String),

  #[error("step not found: {0}")]
  StepNotFound(String),

  #[error("step {0} has not run a command")]
  NoCommand(String),

  #[error("worker not found: {0}")]
  WorkerNotFound(String),

  #[error("source not found: {0}")]
  SourceNotFound(String),

  #[error("output not found: {0}")]
  OutputNotFound(String),

  #[error("output {0} has not been assigned")]
  OutputUnassigned(String),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Expression(#[from] ExpressionError),

  #[error(transparent)]
  Value(#[from] ValueError),

  #[error(transparent)]
  Runtime(#[from] RuntimeError),

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error(transparent)]
  Stored(#[from] StoredError),

  #[error(transparent)]
  Storage(#[from] StorageError),
}

impl EngineError {
  /// Wrap for the expression evaluator's context seam.
  pub(crate) fn into_expression(self) -> ExpressionError {
    match self {
      EngineError::Expression(error) => error,
      other => ExpressionError::Context(Box::new(other)),
    }
  }
}
