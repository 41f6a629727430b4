//! Dahlia Tool
//!
//! Client side of the protocol every worker instance serves:
//!
//! - `GET /manifest` describes the tool's actions and their typed parameters.
//! - `POST /artifacts/` (multipart, `operation=create`) starts an action that
//!   produces a named artifact. Each argument travels as a part named
//!   `arguments[<name>]` whose content type is the value kind's MIME type.
//! - `POST /artifacts/<name>/` with `operation=wait_for_complete` or
//!   `operation=interrupt`.
//! - `GET /artifacts/<name>/status`, `DELETE /artifacts/<name>/`, and
//!   `GET /artifacts/<name>/history/<i>/log`.

mod error;
mod http;
mod manifest;
mod tool;

pub use error::ToolError;
pub use http::{HttpTool, HttpToolConnector};
pub use manifest::{
  ActionDecl, ArtifactStatus, DEFAULT_ACTION, Manifest, MetricDecl, ParameterDecl,
};
pub use tool::{CreateArtifact, Tool, ToolConnector};
