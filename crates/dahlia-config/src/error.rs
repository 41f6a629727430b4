use dahlia_expression::ExpressionError;
use thiserror::Error;

/// Error type for loading and validating workflow definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid yaml: {0}")]
  Yaml(#[from] serde_yaml_ng::Error),

  #[error("invalid json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid expression at {location}: {source}")]
  Expression {
    location: String,
    #[source]
    source: ExpressionError,
  },

  #[error("{location} reads undeclared workflow parameter {name}")]
  UndeclaredParameter { location: String, name: String },

  #[error("{location} references unknown worker {name}")]
  UnknownWorker { location: String, name: String },

  #[error("{location} references unknown step {name}")]
  UnknownStep { location: String, name: String },

  #[error("{location} references step {name}, which does not run before it")]
  StepOrder { location: String, name: String },

  #[error("{location} references unknown output {name}")]
  UnknownOutput { location: String, name: String },

  #[error("invalid step {index}: {message}")]
  InvalidStep { index: usize, message: String },

  #[error("duplicate step name: {0}")]
  DuplicateStepName(String),

  #[error("invalid source {0}: expected EXECUTION:WORKER[@EXECUTOR]")]
  InvalidSource(String),
}
