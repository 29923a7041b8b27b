//! Report type definitions for a run

use crate::status::{InvocationStatus, StageStatus};
use dstage_errors::InvocationError;
use serde::{Deserialize, Serialize};

/// Outcome of one invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvocationReport {
    /// Owning stage
    pub stage: String,
    /// Invocation label (`<build type> on <environment>`)
    pub label: String,
    /// Remote job the invocation was sent to
    pub job: Option<String>,
    /// Tasks sent with the trigger
    pub tasks: Vec<String>,
    pub status: InvocationStatus,
    /// Remote run number, once the run was detected
    pub build_number: Option<u64>,
    /// Link for humans to inspect the run
    pub reference: Option<String>,
    pub error: Option<InvocationError>,
    pub duration_ms: u64,
}

impl InvocationReport {
    /// Report for an invocation that never reached the remote
    #[must_use]
    pub fn not_triggered(
        stage: impl Into<String>,
        label: impl Into<String>,
        tasks: Vec<String>,
        status: InvocationStatus,
    ) -> Self {
        Self {
            stage: stage.into(),
            label: label.into(),
            job: None,
            tasks,
            status,
            build_number: None,
            reference: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Whether the invocation counts as a success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Error kind for reports (`invocation_failed`, `run_timeout`, ...)
    #[must_use]
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(InvocationError::kind)
    }
}

/// Outcome of one stage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub description: String,
    pub status: StageStatus,
    /// Reports for every invocation that was started or cancelled
    pub invocations: Vec<InvocationReport>,
    pub duration_ms: u64,
}

impl StageReport {
    /// First failing invocation, in fan-out order
    #[must_use]
    pub fn first_failure(&self) -> Option<&InvocationReport> {
        self.invocations
            .iter()
            .find(|inv| !inv.is_success() && inv.status != InvocationStatus::Cancelled)
    }
}

/// Root cause attached to a failed or skipped requested stage
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureCause {
    /// Stage whose invocation failed
    pub stage: String,
    /// Invocation label
    pub invocation: String,
    /// Error kind
    pub kind: String,
    pub message: String,
    pub reference: Option<String>,
    pub build_number: Option<u64>,
}

impl FailureCause {
    /// Build a cause from a failed invocation report
    #[must_use]
    pub fn from_report(report: &InvocationReport) -> Self {
        Self {
            stage: report.stage.clone(),
            invocation: report.label.clone(),
            kind: report
                .error_kind()
                .unwrap_or("invocation_failed")
                .to_string(),
            message: report
                .error
                .as_ref()
                .map_or_else(|| report.status.to_string(), ToString::to_string),
            reference: report.reference.clone(),
            build_number: report.build_number,
        }
    }
}

/// Status of one requested stage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestedStageReport {
    pub name: String,
    pub status: StageStatus,
    pub cause: Option<FailureCause>,
}

/// Final report of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub commit: String,
    /// Requested stages, sorted by name
    pub requested: Vec<RequestedStageReport>,
    /// Every executed stage in plan order
    pub stages: Vec<StageReport>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether every requested stage succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.requested.iter().all(|stage| stage.status.is_success())
    }

    /// Report of an executed stage
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Report of a requested stage
    #[must_use]
    pub fn requested_stage(&self, name: &str) -> Option<&RequestedStageReport> {
        self.requested.iter().find(|stage| stage.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_invocation() -> InvocationReport {
        InvocationReport {
            stage: "A".into(),
            label: "quickTest on linux".into(),
            job: Some("http://ci/job/worker".into()),
            tasks: vec!["test".into()],
            status: InvocationStatus::Failed,
            build_number: Some(12),
            reference: Some("http://ci/job/worker/12/".into()),
            error: Some(InvocationError::Failed {
                job: "http://ci/job/worker".into(),
                build: 12,
                result: "FAILURE".into(),
                url: "http://ci/job/worker/12/".into(),
            }),
            duration_ms: 10,
        }
    }

    #[test]
    fn test_failure_cause_from_report() {
        let cause = FailureCause::from_report(&failed_invocation());
        assert_eq!(cause.stage, "A");
        assert_eq!(cause.kind, "invocation_failed");
        assert_eq!(cause.build_number, Some(12));
        assert_eq!(cause.reference.as_deref(), Some("http://ci/job/worker/12/"));
    }

    #[test]
    fn test_first_failure_ignores_cancelled() {
        let cancelled = InvocationReport::not_triggered(
            "A",
            "slowTest on linux",
            vec![],
            InvocationStatus::Cancelled,
        );
        let stage = StageReport {
            name: "A".into(),
            description: String::new(),
            status: StageStatus::Failed,
            invocations: vec![cancelled, failed_invocation()],
            duration_ms: 0,
        };
        assert_eq!(
            stage.first_failure().map(|inv| inv.label.as_str()),
            Some("quickTest on linux")
        );
    }

    #[test]
    fn test_run_report_success_and_json() {
        let report = RunReport {
            commit: "d10e26a2".into(),
            requested: vec![RequestedStageReport {
                name: "commitStage".into(),
                status: StageStatus::Succeeded,
                cause: None,
            }],
            stages: vec![],
            duration_ms: 1,
        };
        assert!(report.is_success());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["requested"][0]["status"], "succeeded");
    }
}
