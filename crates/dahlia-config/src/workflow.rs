use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use dahlia_expression::Expression;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::step::{AssignmentSource, StepDef};
use crate::worker::{OutputDef, ParameterDef, WorkerDef};

/// A workflow definition as written by a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub parameters: BTreeMap<String, ParameterDef>,

  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub workers: BTreeMap<String, WorkerDef>,

  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub outputs: BTreeMap<String, OutputDef>,

  #[serde(default)]
  pub steps: Vec<StepDef>,
}

impl WorkflowDef {
  pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_yaml_ng::from_str(text)?)
  }

  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(text)?)
  }

  /// Load a `.json` file as JSON and anything else as YAML.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
      Some("json") => Self::from_json(&text),
      _ => Self::from_yaml(&text),
    }
  }

  /// Index of the step called `name`.
  pub fn step_index(&self, name: &str) -> Option<usize> {
    self
      .steps
      .iter()
      .position(|step| step.name.as_deref() == Some(name))
  }

  /// Check that every reference in the workflow resolves.
  ///
  /// Steps may only read the artifacts of action steps that run before
  /// them, and expressions may only read declared parameters and workers.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let mut names = HashMap::new();
    for (index, step) in self.steps.iter().enumerate() {
      if let Some(name) = &step.name
        && names.insert(name.as_str(), index).is_some()
      {
        return Err(ConfigError::DuplicateStepName(name.clone()));
      }
    }

    for (name, worker) in &self.workers {
      let location = format!("workers.{}.image", name);
      self.check_expression(&location, &worker.image, None)?;
      for (key, raw) in &worker.environment {
        let location = format!("workers.{}.environment.{}", name, key);
        self.check_expression(&location, raw, None)?;
      }
    }

    for (index, step) in self.steps.iter().enumerate() {
      self.validate_step(index, step)?;
    }
    Ok(())
  }

  fn validate_step(&self, index: usize, step: &StepDef) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidStep {
      index,
      message: message.to_string(),
    };

    if step.wait {
      if step.worker.is_some() || step.artifact.is_some() || step.output.is_some() {
        return Err(invalid("a wait step takes no worker, artifact or output"));
      }
      if step.action.is_some() || !step.arguments.is_empty() {
        return Err(invalid("a wait step takes no action or arguments"));
      }
    } else {
      let worker = step
        .worker
        .as_deref()
        .ok_or_else(|| invalid("an action step needs a worker"))?;
      if step.artifact.is_none() {
        return Err(invalid("an action step needs an artifact"));
      }
      if !self.workers.contains_key(worker) {
        return Err(ConfigError::UnknownWorker {
          location: format!("steps[{}].worker", index),
          name: worker.to_string(),
        });
      }
    }

    if let Some(output) = &step.output {
      self.check_output(&format!("steps[{}].output", index), output)?;
    }

    for (position, assignment) in step.outputs.iter().enumerate() {
      let location = format!("steps[{}].outputs[{}]", index, position);
      self.check_output(&location, &assignment.output)?;
      match &assignment.from {
        AssignmentSource::Step { step: name } => {
          self.check_step_reference(&location, name, index, !step.wait)?
        }
        AssignmentSource::Artifact { worker, .. } => {
          if !self.workers.contains_key(worker) {
            return Err(ConfigError::UnknownWorker {
              location,
              name: worker.clone(),
            });
          }
        }
      }
    }

    for (key, raw) in &step.arguments {
      let location = format!("steps[{}].arguments.{}", index, key);
      self.check_expression(&location, raw, Some(index))?;
    }
    Ok(())
  }

  fn check_output(&self, location: &str, name: &str) -> Result<(), ConfigError> {
    if self.outputs.contains_key(name) {
      Ok(())
    } else {
      Err(ConfigError::UnknownOutput {
        location: location.to_string(),
        name: name.to_string(),
      })
    }
  }

  /// `name` must be an action step that runs before step `index`, or is
  /// step `index` itself when `allow_self` is set.
  fn check_step_reference(
    &self,
    location: &str,
    name: &str,
    index: usize,
    allow_self: bool,
  ) -> Result<(), ConfigError> {
    let referenced = self
      .step_index(name)
      .ok_or_else(|| ConfigError::UnknownStep {
        location: location.to_string(),
        name: name.to_string(),
      })?;

    let runs_before = referenced < index || (allow_self && referenced == index);
    if !runs_before || self.steps[referenced].wait {
      return Err(ConfigError::StepOrder {
        location: location.to_string(),
        name: name.to_string(),
      });
    }
    Ok(())
  }

  /// Parse an expression and check what it reads. `step` is the index of
  /// the step the expression belongs to; worker recipes pass `None` and may
  /// not read step artifacts.
  fn check_expression(
    &self,
    location: &str,
    raw: &serde_json::Value,
    step: Option<usize>,
  ) -> Result<(), ConfigError> {
    let expression = Expression::parse(raw).map_err(|source| ConfigError::Expression {
      location: location.to_string(),
      source,
    })?;

    for name in expression.referenced_parameters() {
      if !self.parameters.contains_key(&name) {
        return Err(ConfigError::UndeclaredParameter {
          location: location.to_string(),
          name,
        });
      }
    }

    for name in expression.referenced_workers() {
      if !self.workers.contains_key(&name) {
        return Err(ConfigError::UnknownWorker {
          location: location.to_string(),
          name,
        });
      }
    }

    for name in expression.referenced_steps() {
      match step {
        Some(index) => self.check_step_reference(location, &name, index, false)?,
        None => {
          return Err(ConfigError::StepOrder {
            location: location.to_string(),
            name,
          });
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::step::OutputAssignment;

  const SCENARIO: &str = r#"
parameters:
  dataset:
    type: url
  epochs:
    default: 3
workers:
  importer:
    image: dahlia/import
  exporter:
    image: dahlia/export
    environment:
      FORMAT: onnx
outputs:
  result:
    label: Exported model
steps:
  - name: import
    worker: importer
    artifact: dataset
    arguments:
      source:
        type: workflow-parameter
        name: dataset
  - name: export
    worker: exporter
    artifact: model
    arguments:
      input:
        type: artifact
        step: import
      epochs:
        type: workflow-parameter
        name: epochs
  - name: review
    wait: true
    outputs:
      - output: result
        step: export
"#;

  fn scenario() -> WorkflowDef {
    WorkflowDef::from_yaml(SCENARIO).unwrap()
  }

  #[test]
  fn test_load_yaml() {
    let workflow = scenario();
    assert_eq!(workflow.steps.len(), 3);
    assert!(workflow.steps[2].wait);
    assert_eq!(
      workflow.steps[2].outputs,
      vec![OutputAssignment {
        output: "result".into(),
        from: AssignmentSource::Step {
          step: "export".into()
        },
      }]
    );
    assert_eq!(workflow.parameters["epochs"].default, Some(json!(3)));
    assert_eq!(workflow.step_index("export"), Some(1));
    workflow.validate().unwrap();
  }

  #[test]
  fn test_json_round_trip_through_storage_form() {
    let workflow = scenario();
    let text = serde_json::to_string(&workflow).unwrap();
    assert_eq!(WorkflowDef::from_json(&text).unwrap(), workflow);
  }

  #[test]
  fn test_load_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workflow.json");
    std::fs::write(&path, serde_json::to_string(&scenario()).unwrap()).unwrap();
    assert_eq!(WorkflowDef::load(&path).unwrap(), scenario());

    let path = dir.path().join("workflow.yaml");
    std::fs::write(&path, SCENARIO).unwrap();
    assert_eq!(WorkflowDef::load(&path).unwrap(), scenario());
  }

  #[test]
  fn test_undeclared_parameter() {
    let mut workflow = scenario();
    workflow.steps[0].arguments.insert(
      "extra".into(),
      json!({"type": "workflow-parameter", "name": "missing"}),
    );
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::UndeclaredParameter { name, .. }) if name == "missing"
    ));
  }

  #[test]
  fn test_step_shapes() {
    let mut workflow = scenario();
    workflow.steps[2].worker = Some("importer".into());
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::InvalidStep { index: 2, .. })
    ));

    let mut workflow = scenario();
    workflow.steps[0].artifact = None;
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::InvalidStep { index: 0, .. })
    ));

    let mut workflow = scenario();
    workflow.steps[0].worker = Some("trainer".into());
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::UnknownWorker { .. })
    ));
  }

  #[test]
  fn test_forward_step_reference() {
    let mut workflow = scenario();
    workflow.steps[0]
      .arguments
      .insert("later".into(), json!({"type": "artifact", "step": "export"}));
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::StepOrder { .. })
    ));
  }

  #[test]
  fn test_duplicate_names_and_outputs() {
    let mut workflow = scenario();
    workflow.steps[1].name = Some("import".into());
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::DuplicateStepName(_))
    ));

    let mut workflow = scenario();
    workflow.steps[1].output = Some("nope".into());
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::UnknownOutput { .. })
    ));
  }

  #[test]
  fn test_unknown_expression_type() {
    let mut workflow = scenario();
    workflow.steps[0]
      .arguments
      .insert("bad".into(), json!({"type": "shell", "command": "ls"}));
    assert!(matches!(
      workflow.validate(),
      Err(ConfigError::Expression { .. })
    ));
  }
}
