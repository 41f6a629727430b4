//! Dahlia Engine
//!
//! Drives workflow executions. An [`Executor`] creates executions under a
//! storage root; each [`Execution`] runs its steps strictly in order, one
//! remote tool action at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Executor                           │
//! │  - create_execution(request) validates, binds arguments,    │
//! │    creates the runtime application, writes the records      │
//! │  - execution(name), names(), delete_execution(name)         │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Execution                          │
//! │  - execute(): workers → sources → steps, resumable          │
//! │  - retry(options): clean from a step, then execute()        │
//! │  - summary(), step_log(), save_artifact(), interrupt        │
//! └─────────────────────────────────────────────────────────────┘
//!                │                               │
//!                ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │   Runtime / Application   │   │           Tool            │
//! │   instances for workers   │   │  create, poll, log, ...   │
//! └───────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! State lives only in storage (see the layout in `records`), so a process
//! may stop at any point and a later [`Execution::execute`] call resumes at
//! the first step that has not completed.
//!
//! # Usage
//!
//! ```ignore
//! let executor = Executor::new(storage, runtimes, Arc::new(HttpToolConnector::new()));
//! let execution = executor
//!   .create_execution(NewExecution::new("run-1", workflow, config))
//!   .await?;
//! match execution.execute().await? {
//!   ExecutionStatus::Suspended => { /* inspect outputs, then execute() again */ }
//!   ExecutionStatus::Failed => { execution.retry(RetryOptions::default()).await?; }
//!   _ => {}
//! }
//! ```

mod config;
mod context;
mod error;
mod events;
mod execution;
mod executor;
mod records;
mod retry;
mod status;
mod summary;

pub use config::{EngineConfig, SimpleExecutionConfig};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use execution::{ArtifactSelector, Execution, SOURCE_SCHEME};
pub use executor::{Executor, NewExecution};
pub use retry::RetryOptions;
pub use status::{ExecutionStatus, OutputStatus, StepStatus, WorkerStatus};
pub use summary::{ExecutionSummary, InstanceSummary, OutputSummary, StepSummary};
