//! Storage layout of an execution.
//!
//! ```text
//! <execution>/
//!   status  current_step  created_at  application  interrupt_requested
//!   workflow.json  config.json
//!   context/<entry>
//!   arguments/<parameter>/{kind, value | url | data}
//!   steps/<index>/{name, status, command_index, error}
//!   workers/<name>/{status, instance}
//!   sources/<name>/{status, description, instance}
//!   outputs/<name>/{status, label, worker, artifact, step}
//! ```

use chrono::{DateTime, Utc};
use dahlia_config::{SourceDef, WorkflowDef};
use dahlia_runtime::InstanceRef;
use dahlia_storage::Storage;
use dahlia_storage::stored::{
  JsonField, StoredError, StoredNamedObjectMap, StoredObject, StoredOrderedNamedObjectList,
  StringField, TextField,
};

use crate::config::SimpleExecutionConfig;
use crate::status::{ExecutionStatus, OutputStatus, StepStatus, WorkerStatus};

macro_rules! stored_record {
  ($name:ident, $kind:literal) => {
    #[derive(Clone)]
    pub(crate) struct $name {
      pub(crate) storage: Storage,
    }

    impl StoredObject for $name {
      const KIND: &'static str = $kind;

      fn open(storage: Storage) -> Self {
        Self { storage }
      }
    }
  };
}

stored_record!(ExecutionRecord, "execution");
stored_record!(StepRecord, "step");
stored_record!(WorkerRecord, "worker");
stored_record!(SourceRecord, "source");
stored_record!(OutputRecord, "output");

impl ExecutionRecord {
  pub(crate) fn status(&self) -> TextField<ExecutionStatus> {
    TextField::required(&self.storage, "status")
  }

  /// Whether creation finished. `status` is the last key it writes.
  pub(crate) async fn is_complete(&self) -> Result<bool, StoredError> {
    Ok(self.storage.exists("status").await?)
  }

  pub(crate) fn current_step(&self) -> TextField<usize> {
    TextField::new(&self.storage, "current_step")
  }

  pub(crate) fn created_at(&self) -> JsonField<DateTime<Utc>> {
    JsonField::required(&self.storage, "created_at")
  }

  /// Name of the runtime application owning this execution's instances.
  pub(crate) fn application(&self) -> StringField {
    StringField::required(&self.storage, "application")
  }

  pub(crate) fn interrupt_requested(&self) -> TextField<bool> {
    TextField::new(&self.storage, "interrupt_requested")
  }

  pub(crate) fn workflow(&self) -> JsonField<WorkflowDef> {
    JsonField::required(&self.storage, "workflow.json")
  }

  pub(crate) fn config(&self) -> JsonField<SimpleExecutionConfig> {
    JsonField::required(&self.storage, "config.json")
  }

  pub(crate) fn context(&self) -> Storage {
    self.storage.substorage("context")
  }

  /// Directory holding the bound value of `parameter`.
  pub(crate) fn argument(&self, parameter: &str) -> Storage {
    self.storage.substorage("arguments").substorage(parameter)
  }

  pub(crate) fn steps(&self) -> StoredOrderedNamedObjectList<StepRecord> {
    StoredOrderedNamedObjectList::new(self.storage.substorage("steps"))
  }

  pub(crate) fn workers(&self) -> StoredNamedObjectMap<WorkerRecord> {
    StoredNamedObjectMap::new(self.storage.substorage("workers"))
  }

  pub(crate) fn sources(&self) -> StoredNamedObjectMap<SourceRecord> {
    StoredNamedObjectMap::new(self.storage.substorage("sources"))
  }

  pub(crate) fn outputs(&self) -> StoredNamedObjectMap<OutputRecord> {
    StoredNamedObjectMap::new(self.storage.substorage("outputs"))
  }
}

impl StepRecord {
  pub(crate) fn name(&self) -> StringField {
    StringField::new(&self.storage, "name")
  }

  pub(crate) fn status(&self) -> TextField<StepStatus> {
    TextField::new(&self.storage, "status")
  }

  /// Index of the last command sent for this step's artifact.
  pub(crate) fn command_index(&self) -> TextField<usize> {
    TextField::new(&self.storage, "command_index")
  }

  pub(crate) fn error(&self) -> StringField {
    StringField::new(&self.storage, "error")
  }

  /// Write a fresh pending step.
  pub(crate) async fn reset(&self, name: Option<&String>) -> Result<(), StoredError> {
    self.name().set_optional(name).await?;
    self.command_index().unset().await?;
    self.error().unset().await?;
    self.status().set(&StepStatus::Pending).await
  }
}

impl WorkerRecord {
  pub(crate) fn status(&self) -> TextField<WorkerStatus> {
    TextField::new(&self.storage, "status")
  }

  pub(crate) fn instance(&self) -> JsonField<InstanceRef> {
    JsonField::new(&self.storage, "instance")
  }
}

impl SourceRecord {
  pub(crate) fn status(&self) -> TextField<WorkerStatus> {
    TextField::new(&self.storage, "status")
  }

  pub(crate) fn description(&self) -> JsonField<SourceDef> {
    JsonField::required(&self.storage, "description")
  }

  pub(crate) fn instance(&self) -> JsonField<InstanceRef> {
    JsonField::new(&self.storage, "instance")
  }
}

impl OutputRecord {
  pub(crate) fn status(&self) -> TextField<OutputStatus> {
    TextField::new(&self.storage, "status")
  }

  pub(crate) fn label(&self) -> StringField {
    StringField::new(&self.storage, "label")
  }

  pub(crate) fn worker(&self) -> StringField {
    StringField::new(&self.storage, "worker")
  }

  pub(crate) fn artifact(&self) -> StringField {
    StringField::new(&self.storage, "artifact")
  }

  /// Index of the step that made the assignment.
  pub(crate) fn step(&self) -> TextField<usize> {
    TextField::new(&self.storage, "step")
  }

  pub(crate) async fn clear(&self) -> Result<(), StoredError> {
    self.worker().unset().await?;
    self.artifact().unset().await?;
    self.step().unset().await?;
    self.status().set(&OutputStatus::Pending).await
  }
}
