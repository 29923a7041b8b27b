//! Run-time status of stages and invocations

use dstage_errors::InvocationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a stage during one run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never started because a dependency did not succeed
    Skipped,
}

impl StageStatus {
    /// Whether the stage reached a final state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        };
        f.write_str(label)
    }
}

/// Terminal state of one invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Succeeded,
    /// The remote build finished and reported failure
    Failed,
    TriggerTimeout,
    RunTimeout,
    RemoteError,
    /// Never triggered because the stage had already failed
    Cancelled,
    /// Nothing to run after task resolution
    NoTargets,
}

impl InvocationStatus {
    /// Whether this outcome counts towards stage success
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::NoTargets)
    }
}

impl From<&InvocationError> for InvocationStatus {
    fn from(err: &InvocationError) -> Self {
        match err {
            InvocationError::TriggerTimeout { .. } => Self::TriggerTimeout,
            InvocationError::RunTimeout { .. } => Self::RunTimeout,
            InvocationError::Failed { .. } => Self::Failed,
            InvocationError::Remote { .. } => Self::RemoteError,
        }
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TriggerTimeout => "trigger timeout",
            Self::RunTimeout => "run timeout",
            Self::RemoteError => "remote error",
            Self::Cancelled => "cancelled",
            Self::NoTargets => "no targets",
        };
        f.write_str(label)
    }
}
