use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::error::ExpressionError;

/// Which artifact an `artifact` expression points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactTarget {
  /// The artifact produced by a named step.
  Step(String),
  /// An artifact addressed directly on a worker.
  Worker { worker: String, name: String },
}

/// Which part of an artifact an `artifact` expression resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactPart {
  #[default]
  Data,
  Artifact,
}

/// A parsed argument recipe.
///
/// Bare strings, numbers, lists and objects are literals. An object with a
/// `type` key is a typed node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
  String(String),
  /// A number, boolean or null.
  Scalar(Json),
  Map(BTreeMap<String, Expression>),
  List(Vec<Expression>),
  WorkflowParameter {
    name: String,
  },
  WorkflowContextFile {
    name: String,
  },
  Environment {
    name: String,
  },
  Artifact {
    target: ArtifactTarget,
    part: ArtifactPart,
    path: Option<String>,
  },
  WorkerUrl {
    name: String,
    path: Option<String>,
  },
}

fn string_field(
  object: &serde_json::Map<String, Json>,
  kind: &'static str,
  field: &'static str,
) -> Result<Option<String>, ExpressionError> {
  match object.get(field) {
    None | Some(Json::Null) => Ok(None),
    Some(Json::String(s)) => Ok(Some(s.clone())),
    Some(other) => Err(ExpressionError::Invalid(format!(
      "{}.{} must be a string, got {}",
      kind, field, other
    ))),
  }
}

fn required_field(
  object: &serde_json::Map<String, Json>,
  kind: &'static str,
  field: &'static str,
) -> Result<String, ExpressionError> {
  string_field(object, kind, field)?.ok_or(ExpressionError::MissingField { kind, field })
}

impl Expression {
  /// Parse a raw JSON/YAML node.
  pub fn parse(raw: &Json) -> Result<Self, ExpressionError> {
    match raw {
      Json::String(s) => Ok(Expression::String(s.clone())),
      Json::Null | Json::Bool(_) | Json::Number(_) => Ok(Expression::Scalar(raw.clone())),
      Json::Array(items) => Ok(Expression::List(
        items.iter().map(Expression::parse).collect::<Result<_, _>>()?,
      )),
      Json::Object(object) => match object.get("type") {
        None => Ok(Expression::Map(
          object
            .iter()
            .map(|(key, value)| Ok((key.clone(), Expression::parse(value)?)))
            .collect::<Result<_, ExpressionError>>()?,
        )),
        Some(Json::String(kind)) => Self::parse_typed(kind, object),
        Some(other) => Err(ExpressionError::Invalid(format!(
          "expression type must be a string, got {}",
          other
        ))),
      },
    }
  }

  fn parse_typed(
    kind: &str,
    object: &serde_json::Map<String, Json>,
  ) -> Result<Self, ExpressionError> {
    match kind {
      "workflow-parameter" => Ok(Expression::WorkflowParameter {
        name: required_field(object, "workflow-parameter", "name")?,
      }),
      "workflow-context-file" => Ok(Expression::WorkflowContextFile {
        name: required_field(object, "workflow-context-file", "name")?,
      }),
      "environment" => Ok(Expression::Environment {
        name: required_field(object, "environment", "name")?,
      }),
      "worker-url" => Ok(Expression::WorkerUrl {
        name: required_field(object, "worker-url", "name")?,
        path: string_field(object, "worker-url", "path")?,
      }),
      "artifact" => {
        let step = string_field(object, "artifact", "step")?;
        let worker = string_field(object, "artifact", "worker")?;
        let name = string_field(object, "artifact", "name")?;

        let target = match (step, worker, name) {
          (Some(step), None, None) => ArtifactTarget::Step(step),
          (None, Some(worker), Some(name)) => ArtifactTarget::Worker { worker, name },
          (None, Some(_), None) => {
            return Err(ExpressionError::MissingField {
              kind: "artifact",
              field: "name",
            });
          }
          (None, None, _) => {
            return Err(ExpressionError::MissingField {
              kind: "artifact",
              field: "step",
            });
          }
          (Some(_), _, _) => {
            return Err(ExpressionError::Invalid(
              "artifact takes either step or worker and name, not both".to_string(),
            ));
          }
        };

        let part = match string_field(object, "artifact", "part")?.as_deref() {
          None | Some("data") => ArtifactPart::Data,
          Some("artifact") => ArtifactPart::Artifact,
          Some(other) => {
            return Err(ExpressionError::Invalid(format!(
              "artifact part must be data or artifact, got {}",
              other
            )));
          }
        };

        Ok(Expression::Artifact {
          target,
          part,
          path: string_field(object, "artifact", "path")?,
        })
      }
      other => Err(ExpressionError::UnknownType(other.to_string())),
    }
  }

  /// Call `f` on this node and every nested node.
  pub fn visit(&self, f: &mut impl FnMut(&Expression)) {
    f(self);
    match self {
      Expression::Map(entries) => entries.values().for_each(|e| e.visit(f)),
      Expression::List(items) => items.iter().for_each(|e| e.visit(f)),
      _ => {}
    }
  }

  /// Names of all workflow parameters this expression reads.
  pub fn referenced_parameters(&self) -> Vec<String> {
    let mut names = Vec::new();
    self.visit(&mut |node| {
      if let Expression::WorkflowParameter { name } = node {
        names.push(name.clone());
      }
    });
    names
  }

  /// Names of all workers this expression reads.
  pub fn referenced_workers(&self) -> Vec<String> {
    let mut names = Vec::new();
    self.visit(&mut |node| match node {
      Expression::WorkerUrl { name, .. } => names.push(name.clone()),
      Expression::Artifact {
        target: ArtifactTarget::Worker { worker, .. },
        ..
      } => names.push(worker.clone()),
      _ => {}
    });
    names
  }

  /// Names of all steps whose artifacts this expression reads.
  pub fn referenced_steps(&self) -> Vec<String> {
    let mut names = Vec::new();
    self.visit(&mut |node| {
      if let Expression::Artifact {
        target: ArtifactTarget::Step(step),
        ..
      } = node
      {
        names.push(step.clone());
      }
    });
    names
  }
}
