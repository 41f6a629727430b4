use dahlia_value::ValueError;
use thiserror::Error;

/// Error type for parsing and evaluating expressions.
#[derive(Debug, Error)]
pub enum ExpressionError {
  /// A typed node names a type the evaluator does not know.
  #[error("unknown expression type: {0}")]
  UnknownType(String),

  #[error("expression type {kind} is missing field {field}")]
  MissingField { kind: &'static str, field: &'static str },

  #[error("invalid expression: {0}")]
  Invalid(String),

  #[error("undeclared workflow parameter: {0}")]
  ParameterNotFound(String),

  #[error("context file not found: {0}")]
  ContextFileNotFound(String),

  #[error("environment variable not set: {0}")]
  EnvironmentNotFound(String),

  #[error("step not found: {0}")]
  StepNotFound(String),

  #[error("worker not found: {0}")]
  WorkerNotFound(String),

  #[error("artifact {artifact} not found on worker {worker}")]
  ArtifactNotFound { worker: String, artifact: String },

  #[error(transparent)]
  Value(#[from] ValueError),

  /// The evaluation context failed for a reason of its own.
  #[error("evaluation context error: {0}")]
  Context(#[source] Box<dyn std::error::Error + Send + Sync>),
}
