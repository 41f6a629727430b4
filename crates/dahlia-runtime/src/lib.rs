//! Dahlia Runtime
//!
//! The container-lifecycle seam. A [`Runtime`] creates one [`Application`]
//! per execution; the application builds images and turns them into
//! [`Instance`]s, each a reachable HTTP endpoint serving a tool.
//!
//! [`RuntimeRegistry`] selects a runtime by the scheme of an execution's
//! runtime URL. [`ExternalRuntime`] serves pre-provisioned endpoints and
//! keeps its bookkeeping in a Dahlia storage tree.

mod error;
mod external;
mod runtime;
mod types;

pub use error::RuntimeError;
pub use external::ExternalRuntime;
pub use runtime::{Application, Instance, Runtime, RuntimeRegistry};
pub use types::{Image, ImageConfig, InstanceConfig, InstanceRef, InstanceStatus};
