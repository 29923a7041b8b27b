use serde::{Deserialize, Serialize};

/// Stage lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageEvent {
    /// Waiting for dependencies to finish
    Waiting {
        stage: String,
        dependencies: Vec<String>,
    },

    /// All dependencies succeeded, invocations are being dispatched
    Started {
        stage: String,
        description: String,
        invocations: usize,
    },

    Succeeded { stage: String, duration_ms: u64 },

    /// An invocation failed; remaining in-flight invocations still drain
    Failed {
        stage: String,
        invocation: String,
        error: String,
        duration_ms: u64,
    },

    /// A dependency did not succeed, nothing was triggered
    Skipped {
        stage: String,
        failed_dependency: String,
    },
}

impl StageEvent {
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Waiting { stage, .. }
            | Self::Started { stage, .. }
            | Self::Succeeded { stage, .. }
            | Self::Failed { stage, .. }
            | Self::Skipped { stage, .. } => stage,
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Waiting {
                stage,
                dependencies,
            } => format!("{stage} waiting for {}", dependencies.join(", ")),
            Self::Started {
                stage,
                description,
                invocations,
            } => format!("{stage} started ({invocations} invocation(s)): {description}"),
            Self::Succeeded { stage, duration_ms } => {
                format!("{stage} succeeded in {duration_ms}ms")
            }
            Self::Failed {
                stage,
                invocation,
                error,
                ..
            } => format!("{stage} failed: {invocation}: {error}"),
            Self::Skipped {
                stage,
                failed_dependency,
            } => format!("{stage} skipped, dependency {failed_dependency} did not succeed"),
        }
    }
}
