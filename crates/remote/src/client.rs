//! Trigger/poll protocol client

use crate::api::{BuildStatus, RemoteJobApi};
use dstage_config::PollingConfig;
use dstage_errors::{Error, InvocationError};
use dstage_events::{EventEmitter, EventSender, FailureContext, InvocationEvent};
use dstage_types::{InvocationReport, InvocationStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Timing bounds for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Budget for the remote to pick the job up
    pub start_timeout: Duration,
    /// Budget for a started build to finish
    pub run_timeout: Duration,
    /// Cap on the iterations of each poll loop
    pub max_polls: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            start_timeout: config.start_timeout(),
            run_timeout: config.run_timeout(),
            max_polls: config.max_polls,
        }
    }
}

/// Everything needed to run one invocation remotely
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub stage: String,
    /// `<build type> on <environment>`
    pub label: String,
    /// Job base URL
    pub job: String,
    pub tasks: Vec<String>,
    pub commit: String,
}

/// What is known about the remote run so far
#[derive(Debug, Default)]
struct Progress {
    build: Option<u64>,
    reference: Option<String>,
}

/// Runs the trigger/poll protocol for one invocation at a time.
///
/// The steps are strictly sequential: read the baseline build number,
/// trigger, wait for the build number to move, then poll the new build
/// until it stops building. Every wait is bounded by a deadline and by
/// `max_polls`.
#[derive(Clone)]
pub struct TriggerPollClient {
    api: Arc<dyn RemoteJobApi>,
    settings: PollSettings,
    events: Option<EventSender>,
}

impl EventEmitter for TriggerPollClient {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl TriggerPollClient {
    #[must_use]
    pub fn new(api: Arc<dyn RemoteJobApi>, settings: PollSettings) -> Self {
        Self {
            api,
            settings,
            events: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Run one invocation to its terminal outcome.
    ///
    /// Never fails: timeouts, failed builds and transport errors are all
    /// captured in the returned report.
    pub async fn run(&self, ctx: &InvocationContext) -> InvocationReport {
        let started = Instant::now();
        let mut progress = Progress::default();

        let outcome = self.execute(ctx, &mut progress).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, error) = match outcome {
            Ok(()) => {
                self.emit_invocation(InvocationEvent::Completed {
                    stage: ctx.stage.clone(),
                    invocation: ctx.label.clone(),
                    build: progress.build.unwrap_or_default(),
                    reference: progress.reference.clone().unwrap_or_default(),
                });
                (InvocationStatus::Succeeded, None)
            }
            Err(err) => {
                self.emit_invocation(InvocationEvent::Failed {
                    stage: ctx.stage.clone(),
                    invocation: ctx.label.clone(),
                    failure: FailureContext::from_error(&err),
                    reference: progress.reference.clone(),
                });
                (InvocationStatus::from(&err), Some(err))
            }
        };

        InvocationReport {
            stage: ctx.stage.clone(),
            label: ctx.label.clone(),
            job: Some(ctx.job.clone()),
            tasks: ctx.tasks.clone(),
            status,
            build_number: progress.build,
            reference: progress.reference,
            error,
            duration_ms,
        }
    }

    async fn execute(
        &self,
        ctx: &InvocationContext,
        progress: &mut Progress,
    ) -> Result<(), InvocationError> {
        let job = ctx.job.as_str();

        let baseline = self
            .api
            .last_build_number(job)
            .await
            .map_err(|e| remote(job, &e))?;

        self.emit_invocation(InvocationEvent::Triggering {
            stage: ctx.stage.clone(),
            invocation: ctx.label.clone(),
            job: job.to_string(),
            tasks: ctx.tasks.clone(),
            baseline,
        });
        self.api
            .trigger(job, &ctx.tasks, &ctx.commit)
            .await
            .map_err(|e| remote(job, &e))?;

        let build = self.detect_start(job, baseline).await?;
        progress.build = Some(build);
        progress.reference = Some(format!("{}/{build}/", job.trim_end_matches('/')));
        self.emit_invocation(InvocationEvent::Started {
            stage: ctx.stage.clone(),
            invocation: ctx.label.clone(),
            build,
        });

        let status = self.await_completion(ctx, build).await?;
        if let Some(url) = &status.url {
            progress.reference = Some(url.clone());
        }

        if status.is_success() {
            Ok(())
        } else {
            Err(InvocationError::Failed {
                job: job.to_string(),
                build,
                result: status.result.unwrap_or_default(),
                url: progress.reference.clone().unwrap_or_default(),
            })
        }
    }

    /// Poll the last build number until it moves away from `baseline`
    async fn detect_start(&self, job: &str, baseline: Option<u64>) -> Result<u64, InvocationError> {
        let started = Instant::now();
        let deadline = started + self.settings.start_timeout;
        let mut polls = 0u32;

        loop {
            sleep(self.settings.interval).await;
            polls += 1;

            let current = self
                .api
                .last_build_number(job)
                .await
                .map_err(|e| remote(job, &e))?;
            tracing::debug!(job, ?baseline, ?current, polls, "waiting for build to start");

            if let Some(number) = current {
                if current != baseline {
                    return Ok(number);
                }
            }

            if polls >= self.settings.max_polls || Instant::now() >= deadline {
                return Err(InvocationError::TriggerTimeout {
                    job: job.to_string(),
                    baseline,
                    waited_ms: elapsed_ms(started),
                });
            }
        }
    }

    /// Poll build `build` until it reports it is no longer building
    async fn await_completion(
        &self,
        ctx: &InvocationContext,
        build: u64,
    ) -> Result<BuildStatus, InvocationError> {
        let job = ctx.job.as_str();
        let started = Instant::now();
        let deadline = started + self.settings.run_timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let status = self
                .api
                .build_status(job, build)
                .await
                .map_err(|e| remote(job, &e))?;

            if !status.building {
                return Ok(status);
            }

            self.emit_invocation(InvocationEvent::Polled {
                stage: ctx.stage.clone(),
                invocation: ctx.label.clone(),
                build,
                polls,
            });

            if polls >= self.settings.max_polls || Instant::now() >= deadline {
                return Err(InvocationError::RunTimeout {
                    job: job.to_string(),
                    build,
                    waited_ms: elapsed_ms(started),
                });
            }

            sleep(self.settings.interval).await;
        }
    }
}

fn remote(job: &str, err: &Error) -> InvocationError {
    InvocationError::Remote {
        job: job.to_string(),
        message: err.to_string(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
