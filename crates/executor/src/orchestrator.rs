//! Plan, wire, execute and report one run

use crate::report;
use crate::resources::InvocationLimiter;
use crate::stage::{RunContext, StageTask};
use crate::state::RunState;
use dstage_config::Config;
use dstage_errors::Error;
use dstage_events::{AppEvent, EventEmitter, EventSender, PlanEvent};
use dstage_net::{NetClient, NetConfig};
use dstage_planner::{plan, wire, ExecutionPlan, TaskCatalog, Wiring};
use dstage_remote::{JenkinsApi, PollSettings, RemoteJobApi, TriggerPollClient};
use dstage_types::{Pipeline, RunReport, StageReport, StageStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Result of the checks that precede a run
#[derive(Debug)]
pub struct RunPlan {
    pub plan: ExecutionPlan,
    pub wiring: Wiring,
    /// Environment name -> job URL
    pub jobs: HashMap<String, String>,
}

/// Entry point of the core: runs requested stages of a pipeline
pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    config: Config,
    api: Arc<dyn RemoteJobApi>,
    events: Option<EventSender>,
    state: RunState,
}

impl EventEmitter for Orchestrator {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, config: Config, api: Arc<dyn RemoteJobApi>) -> Self {
        Self {
            pipeline,
            config,
            api,
            events: None,
            state: RunState::default(),
        }
    }

    /// Build an orchestrator talking HTTP to the configured build server
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(pipeline: Arc<Pipeline>, config: Config) -> Result<Self, Error> {
        let client = NetClient::new(NetConfig::from(&config.network))?;
        let api = Arc::new(JenkinsApi::new(client)?);
        Ok(Self::new(pipeline, config, api))
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Status map of the most recent run
    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Plan, wire and resolve job URLs without touching any remote job.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` for unknown stages, unknown dependencies,
    /// cycles, unit collisions and undeclared tasks, and
    /// `ConfigError::MissingJobUrl` for environments without a job URL.
    pub fn prepare<S: AsRef<str>>(&self, requested: &[S]) -> Result<RunPlan, Error> {
        let plan = plan(&self.pipeline, requested)?;
        self.emit(AppEvent::Plan(PlanEvent::Computed {
            requested: plan.requested().to_vec(),
            stages: plan.stages().iter().map(|s| s.name.clone()).collect(),
            batches: plan.batches().to_vec(),
        }));

        let catalog = self.catalog();
        let wiring = wire(&plan, catalog.as_ref(), &self.config.fanout.subunits)?;
        self.emit(AppEvent::Plan(PlanEvent::Wired {
            targets: wiring.additional_units().len(),
            additional_units: wiring.additional_units().to_vec(),
        }));

        let jobs = self.resolve_jobs(&plan)?;
        Ok(RunPlan { plan, wiring, jobs })
    }

    /// Run the requested stages at `commit`.
    ///
    /// Everything [`Self::prepare`] checks happens before the first remote
    /// call and is returned as an error. Once execution starts, every
    /// remote outcome ends up in the report instead.
    ///
    /// # Errors
    ///
    /// See [`Self::prepare`].
    pub async fn run<S: AsRef<str>>(
        &mut self,
        requested: &[S],
        commit: &str,
    ) -> Result<RunReport, Error> {
        let started = Instant::now();
        let RunPlan { plan, wiring, jobs } = self.prepare(requested)?;

        self.state = RunState::for_plan(&plan);
        let stages = self.execute(&plan, wiring, jobs, commit).await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = report::build(&plan, stages, commit, duration_ms);

        tracing::info!(
            commit,
            success = report.is_success(),
            duration_ms,
            "run finished"
        );
        Ok(report)
    }

    /// `None` selects passthrough wiring
    fn catalog(&self) -> Option<TaskCatalog> {
        if self.config.catalog.is_empty() {
            return None;
        }
        Some(
            self.config
                .catalog
                .iter()
                .map(|subunit| (subunit.name.clone(), subunit.tasks.clone()))
                .collect(),
        )
    }

    /// Job URL of every environment used by the plan
    fn resolve_jobs(&self, plan: &ExecutionPlan) -> Result<HashMap<String, String>, Error> {
        let mut jobs = HashMap::new();
        for stage in plan.stages() {
            for invocation in &stage.build_invocations {
                let environment = &invocation.environment.name;
                if !jobs.contains_key(environment) {
                    let url = self.config.job_url_for(environment)?;
                    jobs.insert(environment.clone(), url);
                }
            }
        }
        Ok(jobs)
    }

    async fn execute(
        &self,
        plan: &ExecutionPlan,
        wiring: Wiring,
        jobs: HashMap<String, String>,
        commit: &str,
    ) -> HashMap<String, StageReport> {
        let mut client =
            TriggerPollClient::new(Arc::clone(&self.api), PollSettings::from(&self.config.polling));
        if let Some(events) = &self.events {
            client = client.with_events(events.clone());
        }

        let ctx = Arc::new(RunContext {
            client,
            limiter: InvocationLimiter::new(self.config.execution.max_concurrent_invocations),
            wiring,
            jobs,
            commit: commit.to_string(),
            state: self.state.clone(),
            events: self.events.clone(),
        });

        // One barrier per stage; plan order guarantees dependencies exist first
        let mut barriers: HashMap<String, watch::Receiver<StageStatus>> = HashMap::new();
        let mut join_set = JoinSet::new();

        for stage in plan.stages() {
            let (sender, receiver) = watch::channel(StageStatus::Pending);
            let dependencies = plan
                .dependencies_of(&stage.name)
                .iter()
                .filter_map(|dep| barriers.get(dep).map(|rx| (dep.clone(), rx.clone())))
                .collect();
            barriers.insert(stage.name.clone(), receiver);

            let task = StageTask {
                stage: Arc::clone(stage),
                dependencies,
                barrier: sender,
            };
            join_set.spawn(task.run(Arc::clone(&ctx)));
        }
        drop(barriers);

        let mut reports = HashMap::with_capacity(plan.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => {
                    reports.insert(report.name.clone(), report);
                }
                Err(err) => tracing::error!(error = %err, "stage task did not complete"),
            }
        }
        reports
    }
}
