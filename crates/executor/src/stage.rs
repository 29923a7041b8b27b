//! Per-stage execution: dependency barriers, fan-out and aggregation

use crate::resources::InvocationLimiter;
use crate::state::RunState;
use dstage_errors::InvocationError;
use dstage_events::{EventEmitter, EventSender, InvocationEvent, StageEvent};
use dstage_planner::Wiring;
use dstage_remote::{InvocationContext, TriggerPollClient};
use dstage_types::{InvocationReport, InvocationStatus, Stage, StageReport, StageStatus};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Fold invocation outcomes into a stage status.
///
/// `Succeeded` iff every outcome is a success; the order of `outcomes`
/// does not matter.
pub fn aggregate<I>(outcomes: I) -> StageStatus
where
    I: IntoIterator<Item = InvocationStatus>,
{
    outcomes
        .into_iter()
        .fold(StageStatus::Succeeded, |status, outcome| {
            if outcome.is_success() {
                status
            } else {
                StageStatus::Failed
            }
        })
}

/// Shared, read-only context of one run
pub(crate) struct RunContext {
    pub client: TriggerPollClient,
    pub limiter: InvocationLimiter,
    pub wiring: Wiring,
    /// Environment name -> job URL
    pub jobs: HashMap<String, String>,
    pub commit: String,
    pub state: RunState,
    pub events: Option<EventSender>,
}

impl EventEmitter for RunContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

/// Receiving end of a dependency's barrier
pub(crate) type Barrier = watch::Receiver<StageStatus>;

/// One stage of a run; owns the stage's barrier and state entry
pub(crate) struct StageTask {
    pub stage: Arc<Stage>,
    pub dependencies: Vec<(String, Barrier)>,
    pub barrier: watch::Sender<StageStatus>,
}

/// Invocation description kept for the report in fan-out order
struct Slot {
    label: String,
    job: String,
    tasks: Vec<String>,
}

impl StageTask {
    pub async fn run(self, ctx: Arc<RunContext>) -> StageReport {
        let started = Instant::now();
        let name = self.stage.name.clone();

        if let Some(failed_dependency) = self.wait_for_dependencies(&ctx).await {
            self.publish(&ctx, StageStatus::Skipped);
            ctx.emit_stage(StageEvent::Skipped {
                stage: name.clone(),
                failed_dependency,
            });
            return StageReport {
                name,
                description: self.stage.description.clone(),
                status: StageStatus::Skipped,
                invocations: Vec::new(),
                duration_ms: 0,
            };
        }

        self.publish(&ctx, StageStatus::Running);
        ctx.emit_stage(StageEvent::Started {
            stage: name.clone(),
            description: self.stage.description.clone(),
            invocations: self.stage.build_invocations.len(),
        });

        let invocations = self.run_invocations(&ctx, started).await;
        let status = aggregate(invocations.iter().map(|report| report.status));
        let duration_ms = elapsed_ms(started);

        if status.is_success() {
            self.publish(&ctx, StageStatus::Succeeded);
            ctx.emit_stage(StageEvent::Succeeded {
                stage: name.clone(),
                duration_ms,
            });
        } else if *self.barrier.borrow() != StageStatus::Failed {
            // No outcome was decided while draining, e.g. a lost invocation task
            self.publish(&ctx, StageStatus::Failed);
            if let Some(report) = invocations.iter().find(|report| !report.is_success()) {
                ctx.emit_stage(failed_event(&name, report, duration_ms));
            }
        }

        StageReport {
            name,
            description: self.stage.description.clone(),
            status,
            invocations,
            duration_ms,
        }
    }

    /// Wait until every dependency is terminal; returns the first
    /// dependency seen not to succeed
    async fn wait_for_dependencies(&self, ctx: &RunContext) -> Option<String> {
        if self.dependencies.is_empty() {
            return None;
        }

        ctx.emit_stage(StageEvent::Waiting {
            stage: self.stage.name.clone(),
            dependencies: self.dependencies.iter().map(|(n, _)| n.clone()).collect(),
        });

        let mut waits: FuturesUnordered<_> = self
            .dependencies
            .iter()
            .map(|(name, barrier)| {
                let mut barrier = barrier.clone();
                async move {
                    // A dropped sender means the dependency never finished
                    let status = match barrier.wait_for(|status| status.is_terminal()).await {
                        Ok(status) => *status,
                        Err(_) => StageStatus::Failed,
                    };
                    (name.clone(), status)
                }
            })
            .collect();

        while let Some((name, status)) = waits.next().await {
            if !status.is_success() {
                return Some(name);
            }
        }
        None
    }

    async fn run_invocations(&self, ctx: &Arc<RunContext>, started: Instant) -> Vec<InvocationReport> {
        let name = &self.stage.name;
        let failed = Arc::new(AtomicBool::new(false));
        let mut reports: Vec<Option<InvocationReport>> = vec![None; self.stage.build_invocations.len()];
        let mut slots = Vec::with_capacity(reports.len());
        let mut join_set = JoinSet::new();

        for (idx, invocation) in self.stage.build_invocations.iter().enumerate() {
            let label = invocation.label();
            let tasks = ctx.wiring.targets_for(name, idx).to_vec();
            let job = ctx
                .jobs
                .get(&invocation.environment.name)
                .cloned()
                .unwrap_or_default();
            slots.push(Slot {
                label: label.clone(),
                job: job.clone(),
                tasks: tasks.clone(),
            });

            if tasks.is_empty() {
                ctx.emit_invocation(InvocationEvent::NoTargets {
                    stage: name.clone(),
                    invocation: label.clone(),
                });
                reports[idx] = Some(InvocationReport::not_triggered(
                    name.clone(),
                    label,
                    tasks,
                    InvocationStatus::NoTargets,
                ));
                continue;
            }

            let invocation_ctx = InvocationContext {
                stage: name.clone(),
                label,
                job,
                tasks,
                commit: ctx.commit.clone(),
            };
            let ctx = Arc::clone(ctx);
            let failed = Arc::clone(&failed);

            join_set.spawn(async move {
                let permit = ctx.limiter.acquire(&invocation_ctx.label).await;
                if permit.is_none() || failed.load(Ordering::Acquire) {
                    ctx.emit_invocation(InvocationEvent::Cancelled {
                        stage: invocation_ctx.stage.clone(),
                        invocation: invocation_ctx.label.clone(),
                    });
                    let report = InvocationReport::not_triggered(
                        invocation_ctx.stage,
                        invocation_ctx.label,
                        invocation_ctx.tasks,
                        InvocationStatus::Cancelled,
                    );
                    return (idx, report);
                }
                let report = ctx.client.run(&invocation_ctx).await;
                if !report.is_success() {
                    // Set before the permit is released so queued siblings see it
                    failed.store(true, Ordering::Release);
                }
                drop(permit);
                (idx, report)
            });
        }

        let mut decided = false;
        while let Some(joined) = join_set.join_next().await {
            let (idx, report) = match joined {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(stage = %name, error = %err, "invocation task did not complete");
                    continue;
                }
            };

            if !decided && !report.is_success() && report.status != InvocationStatus::Cancelled {
                decided = true;
                // Dependents are released now; in-flight invocations keep draining
                self.publish(ctx, StageStatus::Failed);
                ctx.emit_stage(failed_event(name, &report, elapsed_ms(started)));
            }

            reports[idx] = Some(report);
        }

        reports
            .into_iter()
            .zip(slots)
            .map(|(report, slot)| report.unwrap_or_else(|| self.lost(slot)))
            .collect()
    }

    /// Report for an invocation whose task panicked or was aborted
    fn lost(&self, slot: Slot) -> InvocationReport {
        let error = InvocationError::Remote {
            job: slot.job.clone(),
            message: "invocation task did not complete".to_string(),
        };
        InvocationReport {
            stage: self.stage.name.clone(),
            label: slot.label,
            job: Some(slot.job),
            tasks: slot.tasks,
            status: InvocationStatus::from(&error),
            build_number: None,
            reference: None,
            error: Some(error),
            duration_ms: 0,
        }
    }

    fn publish(&self, ctx: &RunContext, status: StageStatus) {
        ctx.state.set(&self.stage.name, status);
        // Receivers may all be gone when nothing depends on this stage
        self.barrier.send_replace(status);
    }
}

fn failed_event(stage: &str, report: &InvocationReport, duration_ms: u64) -> StageEvent {
    StageEvent::Failed {
        stage: stage.to_string(),
        invocation: report.label.clone(),
        error: report
            .error
            .as_ref()
            .map_or_else(|| report.status.to_string(), ToString::to_string),
        duration_ms,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
