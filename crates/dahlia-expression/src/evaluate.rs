use async_trait::async_trait;
use dahlia_value::{ResourceValue, Value};
use futures::future::BoxFuture;
use tracing::trace;
use url::Url;

use crate::error::ExpressionError;
use crate::expression::{ArtifactPart, ArtifactTarget, Expression};

/// Live execution state an expression may read.
///
/// Every lookup is made at evaluation time, so an expression evaluated after
/// a worker is recreated sees the new instance.
#[async_trait]
pub trait EvaluationContext: Send + Sync {
  /// The bound argument of a declared workflow parameter.
  async fn parameter(&self, name: &str) -> Result<Value, ExpressionError>;

  /// Bytes of a named context entry.
  async fn context_file(&self, name: &str) -> Result<ResourceValue, ExpressionError>;

  async fn environment(&self, name: &str) -> Result<Option<String>, ExpressionError>;

  /// The worker and artifact names produced by a step.
  async fn step_artifact(&self, step: &str) -> Result<(String, String), ExpressionError>;

  /// Base URL of a worker's running instance.
  async fn worker_url(&self, worker: &str) -> Result<Url, ExpressionError>;

  /// Fail when `artifact` does not exist on `worker`.
  async fn ensure_artifact(&self, _worker: &str, _artifact: &str) -> Result<(), ExpressionError> {
    Ok(())
  }
}

/// Resolve `path` below `base`, treating `base` as a directory.
pub fn join_url(base: &Url, path: &str) -> Result<Url, ExpressionError> {
  let mut base = base.clone();
  if !base.path().ends_with('/') {
    let dir = format!("{}/", base.path());
    base.set_path(&dir);
  }
  base
    .join(path.trim_start_matches('/'))
    .map_err(|e| ExpressionError::Invalid(format!("cannot join {} onto {}: {}", path, base, e)))
}

/// URL of an artifact's root or of (a path inside) its data.
pub fn artifact_url(
  worker_url: &Url,
  artifact: &str,
  part: ArtifactPart,
  path: Option<&str>,
) -> Result<Url, ExpressionError> {
  let root = join_url(worker_url, &format!("artifacts/{}/", artifact))?;
  match part {
    ArtifactPart::Artifact => Ok(root),
    ArtifactPart::Data => join_url(&root, &format!("data/{}", path.unwrap_or_default())),
  }
}

impl Expression {
  /// Resolve this expression to a value.
  ///
  /// Evaluation never changes the context; evaluating twice against the
  /// same state yields equal values.
  pub fn evaluate<'a>(
    &'a self,
    context: &'a dyn EvaluationContext,
  ) -> BoxFuture<'a, Result<Value, ExpressionError>> {
    Box::pin(async move {
      match self {
        Expression::String(s) => Ok(Value::String(s.clone())),
        Expression::Scalar(json) => Ok(Value::PlainObject(json.clone())),
        Expression::Map(entries) => {
          let mut object = serde_json::Map::new();
          for (key, entry) in entries {
            let value = entry.evaluate(context).await?;
            object.insert(key.clone(), value.as_plain_object().await?);
          }
          Ok(Value::PlainObject(serde_json::Value::Object(object)))
        }
        Expression::List(items) => {
          let mut list = Vec::with_capacity(items.len());
          for item in items {
            let value = item.evaluate(context).await?;
            list.push(value.as_plain_object().await?);
          }
          Ok(Value::PlainObject(serde_json::Value::Array(list)))
        }
        Expression::WorkflowParameter { name } => context.parameter(name).await,
        Expression::WorkflowContextFile { name } => {
          Ok(Value::Resource(context.context_file(name).await?))
        }
        Expression::Environment { name } => match context.environment(name).await? {
          Some(value) => Ok(Value::PlainObject(serde_json::Value::String(value))),
          None => Err(ExpressionError::EnvironmentNotFound(name.clone())),
        },
        Expression::Artifact { target, part, path } => {
          let (worker, artifact) = match target {
            ArtifactTarget::Step(step) => context.step_artifact(step).await?,
            ArtifactTarget::Worker { worker, name } => {
              context.ensure_artifact(worker, name).await?;
              (worker.clone(), name.clone())
            }
          };
          let base = context.worker_url(&worker).await?;
          let url = artifact_url(&base, &artifact, *part, path.as_deref())?;
          trace!(%worker, %artifact, %url, "resolved artifact");
          Ok(Value::Url(url))
        }
        Expression::WorkerUrl { name, path } => {
          let base = context.worker_url(name).await?;
          Ok(Value::Url(join_url(&base, path.as_deref().unwrap_or_default())?))
        }
      }
    })
  }
}
