//! Final run report assembly

use dstage_planner::ExecutionPlan;
use dstage_types::{FailureCause, RequestedStageReport, RunReport, StageReport, StageStatus};
use std::collections::HashMap;

/// Assemble the run report from the per-stage reports.
///
/// Stages missing from `stages` (their task never reported) are listed as
/// `Skipped`.
pub(crate) fn build(
    plan: &ExecutionPlan,
    mut stages: HashMap<String, StageReport>,
    commit: &str,
    duration_ms: u64,
) -> RunReport {
    let ordered: Vec<StageReport> = plan
        .stages()
        .iter()
        .map(|stage| {
            stages.remove(&stage.name).unwrap_or_else(|| StageReport {
                name: stage.name.clone(),
                description: stage.description.clone(),
                status: StageStatus::Skipped,
                invocations: Vec::new(),
                duration_ms: 0,
            })
        })
        .collect();

    let by_name: HashMap<&str, &StageReport> = ordered
        .iter()
        .map(|report| (report.name.as_str(), report))
        .collect();

    let requested = plan
        .requested()
        .iter()
        .map(|name| {
            let status = by_name
                .get(name.as_str())
                .map_or(StageStatus::Skipped, |report| report.status);
            let cause = if status.is_success() {
                None
            } else {
                failure_cause(plan, &by_name, name)
            };
            RequestedStageReport {
                name: name.clone(),
                status,
                cause,
            }
        })
        .collect();

    RunReport {
        commit: commit.to_string(),
        requested,
        stages: ordered,
        duration_ms,
    }
}

/// Deepest failed stage below `requested`, ties broken by plan order
fn failure_cause(
    plan: &ExecutionPlan,
    reports: &HashMap<&str, &StageReport>,
    requested: &str,
) -> Option<FailureCause> {
    plan.dependency_depths(requested)
        .into_iter()
        .filter_map(|(name, depth)| {
            let report = reports.get(name.as_str())?;
            if report.status != StageStatus::Failed {
                return None;
            }
            let position = plan.position(&name).unwrap_or(usize::MAX);
            Some((depth, position, *report))
        })
        .min_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)))
        .and_then(|(_, _, report)| report.first_failure())
        .map(FailureCause::from_report)
}
