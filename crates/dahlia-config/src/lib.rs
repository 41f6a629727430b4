//! Dahlia Config
//!
//! Serializable workflow definitions: the ordered steps, the workers they
//! run on, the outputs they publish and the parameters they read. These are
//! loaded from YAML or JSON, validated once with [`WorkflowDef::validate`],
//! and stored verbatim with every execution so that a run can be resumed or
//! retried against exactly the definition it started with.
//!
//! Argument values and worker recipes stay as raw JSON here; they are parsed
//! into expressions by `dahlia-expression`.

mod error;
mod source;
mod step;
mod worker;
mod workflow;

pub use error::ConfigError;
pub use source::SourceDef;
pub use step::{AssignmentSource, OutputAssignment, StepDef};
pub use worker::{OutputDef, ParameterDef, WorkerDef};
pub use workflow::WorkflowDef;
