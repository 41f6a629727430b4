//! Dahlia Expression
//!
//! Step arguments and worker recipes are written as expressions: plain JSON
//! or YAML literals, or objects with a `type` key that read live execution
//! state. This crate parses the raw tree once into an [`Expression`] and
//! evaluates it against an [`EvaluationContext`] supplied by the engine.
//!
//! | type | fields | resolves to |
//! |---|---|---|
//! | (string) | | string |
//! | (object, list, scalar) | | plain object |
//! | `workflow-parameter` | `name` | the bound argument |
//! | `workflow-context-file` | `name` | resource |
//! | `environment` | `name` | plain object (string) |
//! | `artifact` | `step` or `worker` + `name`, `part`, `path` | url |
//! | `worker-url` | `name`, `path` | url |

mod error;
mod evaluate;
mod expression;

pub use error::ExpressionError;
pub use evaluate::{EvaluationContext, artifact_url, join_url};
pub use expression::{ArtifactPart, ArtifactTarget, Expression};
