//! Terminal outcomes of a remote build invocation
//!
//! These are values, not control flow: the executor records them as the
//! invocation's result and folds them into the owning stage's status.

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InvocationError {
    #[error("remote job {job} did not start within {waited_ms}ms (last build still {baseline:?})")]
    TriggerTimeout {
        job: String,
        baseline: Option<u64>,
        waited_ms: u64,
    },

    #[error("build #{build} of {job} still running after {waited_ms}ms")]
    RunTimeout {
        job: String,
        build: u64,
        waited_ms: u64,
    },

    #[error("build #{build} of {job} finished with {result}: {url}")]
    Failed {
        job: String,
        build: u64,
        result: String,
        url: String,
    },

    #[error("remote job {job} unreachable: {message}")]
    Remote { job: String, message: String },
}

impl InvocationError {
    /// Short kind identifier used in run reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TriggerTimeout { .. } => "trigger_timeout",
            Self::RunTimeout { .. } => "run_timeout",
            Self::Failed { .. } => "invocation_failed",
            Self::Remote { .. } => "remote_error",
        }
    }
}

impl UserFacingError for InvocationError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::TriggerTimeout { .. } => {
                Some("Check that the remote job accepts parameterized builds and has free executors.")
            }
            Self::RunTimeout { .. } => Some("The remote build may still be running; inspect it before re-running the stage."),
            Self::Failed { .. } => Some("Open the build link for the failure details."),
            Self::Remote { .. } => Some("Verify the job URL and that the build server is reachable."),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::TriggerTimeout { .. } | Self::Remote { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::TriggerTimeout { .. } => "invocation.trigger_timeout",
            Self::RunTimeout { .. } => "invocation.run_timeout",
            Self::Failed { .. } => "invocation.failed",
            Self::Remote { .. } => "invocation.remote_error",
        };
        Some(code)
    }
}
