//! Core types shared by the kernel and the wire protocol

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    New,
    Running,
    Waiting,
    Preempting,
    Depending,
    Yielding,
    Finished,
    Canceling,
    Failing,
    Dead,
}

impl TaskStatus {
    /// FINISHED and DEAD are terminal-like; the task only comes back through a restart.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Finished | Self::Dead)
    }

    pub fn is_working(self) -> bool {
        matches!(
            self,
            Self::New
                | Self::Running
                | Self::Waiting
                | Self::Preempting
                | Self::Depending
                | Self::Yielding
        )
    }

    pub fn is_withdrawing(self) -> bool {
        matches!(self, Self::Canceling | Self::Failing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Preempting => "preempting",
            Self::Depending => "depending",
            Self::Yielding => "yielding",
            Self::Finished => "finished",
            Self::Canceling => "canceling",
            Self::Failing => "failing",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of a task to intentions that do not belong to it.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    /// Closed to outside intentions
    Private,
    /// Ancestors participate
    Protected,
    /// Global intentions participate
    #[default]
    Public,
}

/// Fresh message id.
pub fn new_mid() -> String {
    uuid::Uuid::new_v4().to_string()
}
