use dahlia_value::ValueError;
use thiserror::Error;

/// Error type for tool protocol calls.
#[derive(Debug, Error)]
pub enum ToolError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The tool answered with an unexpected status.
  #[error("unexpected status {status} from {url}")]
  Status { status: u16, url: String },

  #[error("artifact not found: {0}")]
  ArtifactNotFound(String),

  /// The artifact's command ran and failed.
  #[error("command {command_index} of artifact {artifact} failed")]
  CommandFailed { artifact: String, command_index: usize },

  #[error("tool declares no action {0}")]
  UnknownAction(String),

  #[error("invalid response from tool: {0}")]
  InvalidResponse(String),

  #[error("invalid url: {0}")]
  InvalidUrl(String),

  #[error(transparent)]
  Value(#[from] ValueError),
}
