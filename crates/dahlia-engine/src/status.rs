//! Persisted lifecycle states.
//!
//! Each status is stored as its kebab-case name in a text field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! text_status {
  ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum $name {
      $(
        #[serde(rename = $text)]
        $variant,
      )+
    }

    impl $name {
      pub fn as_str(&self) -> &'static str {
        match self {
          $($name::$variant => $text,)+
        }
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = String;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $($text => Ok($name::$variant),)+
          other => Err(format!("unknown {}: {}", stringify!($name), other)),
        }
      }
    }
  };
}

text_status!(
  /// State of a whole execution.
  ExecutionStatus {
    Pending => "pending",
    InProgress => "in-progress",
    Suspended => "suspended",
    Completed => "completed",
    Failed => "failed",
  }
);

text_status!(
  StepStatus {
    Pending => "pending",
    InProgress => "in-progress",
    Suspended => "suspended",
    Completed => "completed",
    Failed => "failed",
  }
);

text_status!(
  /// Whether a worker or source has an instance yet.
  WorkerStatus {
    Pending => "pending",
    Created => "created",
  }
);

text_status!(
  OutputStatus {
    Pending => "pending",
    Assigned => "assigned",
  }
);
