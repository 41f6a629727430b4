//! Execution events and notifiers for observability.
//!
//! Events are emitted as an execution moves through its steps so that
//! consumers can follow progress, stream it to a terminal, etc.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  ExecutionStarted { execution: String },

  /// A worker got its instance and its tool answered.
  WorkerCreated {
    execution: String,
    worker: String,
    url: String,
  },

  SourceCreated {
    execution: String,
    source: String,
    url: String,
  },

  StepStarted {
    execution: String,
    step: usize,
    name: String,
  },

  StepCompleted { execution: String, step: usize },

  StepFailed {
    execution: String,
    step: usize,
    error: String,
  },

  /// A wait step was reached. `execute` must be called again to continue.
  ExecutionSuspended { execution: String, step: usize },

  ExecutionCompleted { execution: String },

  ExecutionFailed { execution: String, error: String },
}

/// Receives execution events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a step.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
