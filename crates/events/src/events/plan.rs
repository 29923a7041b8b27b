use serde::{Deserialize, Serialize};

/// Events emitted while turning requested stages into an execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlanEvent {
    /// Closure of the requested stages computed
    Computed {
        requested: Vec<String>,
        /// Stages in execution order
        stages: Vec<String>,
        /// Stages grouped into waves that may run concurrently
        batches: Vec<Vec<String>>,
    },

    /// Invocation tasks resolved to execution targets
    Wired {
        targets: usize,
        additional_units: Vec<String>,
    },
}

impl PlanEvent {
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Computed {
                requested, stages, ..
            } => format!(
                "planned {} stage(s) for {}",
                stages.len(),
                requested.join(", ")
            ),
            Self::Wired { targets, .. } => format!("resolved {targets} execution target(s)"),
        }
    }
}
