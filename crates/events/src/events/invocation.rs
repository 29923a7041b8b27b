use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Remote invocation events, one sequence per trigger/poll run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InvocationEvent {
    /// Baseline read, trigger about to be sent
    Triggering {
        stage: String,
        invocation: String,
        job: String,
        tasks: Vec<String>,
        baseline: Option<u64>,
    },

    /// The remote picked up the job as a new build
    Started {
        stage: String,
        invocation: String,
        build: u64,
    },

    /// One completion poll answered "still building"
    Polled {
        stage: String,
        invocation: String,
        build: u64,
        polls: u32,
    },

    Completed {
        stage: String,
        invocation: String,
        build: u64,
        reference: String,
    },

    Failed {
        stage: String,
        invocation: String,
        failure: FailureContext,
        reference: Option<String>,
    },

    /// Never triggered because the stage already failed
    Cancelled { stage: String, invocation: String },

    /// Task resolution left nothing to run
    NoTargets { stage: String, invocation: String },
}

impl InvocationEvent {
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Triggering { stage, .. }
            | Self::Started { stage, .. }
            | Self::Polled { stage, .. }
            | Self::Completed { stage, .. }
            | Self::Failed { stage, .. }
            | Self::Cancelled { stage, .. }
            | Self::NoTargets { stage, .. } => stage,
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Triggering {
                invocation,
                job,
                tasks,
                ..
            } => format!("triggering {invocation} on {job}: {}", tasks.join(" ")),
            Self::Started {
                invocation, build, ..
            } => format!("{invocation} started as build #{build}"),
            Self::Polled {
                invocation,
                build,
                polls,
                ..
            } => format!("{invocation} build #{build} still running (poll {polls})"),
            Self::Completed {
                invocation,
                reference,
                ..
            } => format!("finished {invocation} - {reference}"),
            Self::Failed {
                invocation,
                failure,
                ..
            } => format!("{invocation} failed: {}", failure.message),
            Self::Cancelled { invocation, .. } => format!("{invocation} cancelled"),
            Self::NoTargets { invocation, .. } => {
                format!("{invocation} resolved to no targets")
            }
        }
    }
}
