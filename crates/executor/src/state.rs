//! Execution-state map shared by the stage tasks of one run

use dashmap::DashMap;
use dstage_planner::ExecutionPlan;
use dstage_types::StageStatus;
use std::sync::Arc;

/// Stage name -> current status.
///
/// Each entry is written only by the task that owns the stage; everyone
/// else reads.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    statuses: Arc<DashMap<String, StageStatus>>,
}

impl RunState {
    /// Every plan stage starts out `Pending`
    #[must_use]
    pub fn for_plan(plan: &ExecutionPlan) -> Self {
        let statuses = DashMap::with_capacity(plan.len());
        for stage in plan.stages() {
            statuses.insert(stage.name.clone(), StageStatus::Pending);
        }
        Self {
            statuses: Arc::new(statuses),
        }
    }

    pub(crate) fn set(&self, stage: &str, status: StageStatus) {
        tracing::debug!(stage, %status, "stage status changed");
        self.statuses.insert(stage.to_string(), status);
    }

    #[must_use]
    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.statuses.get(stage).map(|entry| *entry.value())
    }

    /// Copy of every entry, sorted by stage name
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, StageStatus)> {
        let mut entries: Vec<_> = self
            .statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
