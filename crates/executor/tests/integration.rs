//! Integration tests for executor crate

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use dstage_config::{Config, SubunitConfig};
    use dstage_errors::{ConfigError, Error, PipelineError};
    use dstage_events::{channel, AppEvent, StageEvent};
    use dstage_executor::*;
    use dstage_remote::{BuildStatus, RemoteJobApi};
    use dstage_types::{
        BuildEnvironment, BuildInvocation, BuildType, InvocationStatus, Pipeline, Stage,
        StageStatus,
    };
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    /// In-memory build server.
    ///
    /// A trigger queues a build; the next build number read starts it. The
    /// build reports `building` for `running_polls` status reads and then
    /// finishes with `result`. Calls for a job that was never registered
    /// panic.
    #[derive(Default)]
    struct FakeRemote {
        jobs: Mutex<HashMap<String, FakeJob>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    struct FakeJob {
        last: Option<u64>,
        queued: bool,
        result: String,
        running_polls: u32,
        status_reads: u32,
    }

    impl FakeRemote {
        fn job(self, url: &str, last: Option<u64>, result: &str, running_polls: u32) -> Self {
            self.jobs.lock().unwrap().insert(
                url.to_string(),
                FakeJob {
                    last,
                    queued: false,
                    result: result.to_string(),
                    running_polls,
                    status_reads: 0,
                },
            );
            self
        }

        fn record(&self, job: &str, call: String) {
            self.calls.lock().unwrap().push((job.to_string(), call));
        }

        fn calls_for(&self, job: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(j, _)| j == job)
                .count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn triggers(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, call)| call.starts_with("trigger"))
                .map(|(job, _)| job.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RemoteJobApi for FakeRemote {
        async fn last_build_number(&self, job: &str) -> Result<Option<u64>, Error> {
            self.record(job, "number".into());
            let mut jobs = self.jobs.lock().unwrap();
            let state = jobs.get_mut(job).unwrap();
            if state.queued {
                state.queued = false;
                state.last = Some(state.last.unwrap_or(0) + 1);
            }
            Ok(state.last)
        }

        async fn trigger(&self, job: &str, tasks: &[String], commit: &str) -> Result<(), Error> {
            self.record(job, format!("trigger {} @{commit}", tasks.join(" ")));
            self.jobs.lock().unwrap().get_mut(job).unwrap().queued = true;
            Ok(())
        }

        async fn build_status(&self, job: &str, number: u64) -> Result<BuildStatus, Error> {
            self.record(job, format!("status {number}"));
            let mut jobs = self.jobs.lock().unwrap();
            let state = jobs.get_mut(job).unwrap();
            state.status_reads += 1;
            Ok(BuildStatus {
                building: state.status_reads <= state.running_polls,
                result: Some(state.result.clone()),
                url: None,
            })
        }
    }

    fn invocation(build_type: &str, env: &str) -> BuildInvocation {
        BuildInvocation::new(
            Arc::new(BuildType::new(build_type, ["test"])),
            Arc::new(BuildEnvironment::new(env, "linux")),
        )
    }

    fn config(jobs: &[(&str, &str)]) -> Config {
        let mut config = Config::default();
        for (env, url) in jobs {
            config.remote.jobs.insert((*env).to_string(), (*url).to_string());
        }
        config
    }

    fn orchestrator(pipeline: Pipeline, config: Config, remote: &Arc<FakeRemote>) -> Orchestrator {
        Orchestrator::new(Arc::new(pipeline), config, Arc::clone(remote) as Arc<dyn RemoteJobApi>)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_stage_success() {
        let remote = Arc::new(FakeRemote::default().job("http://ci/job/Worker", Some(5), "SUCCESS", 0));
        let pipeline = Pipeline::builder()
            .stage(Stage::new("commitStage", "Commit").with_invocation(invocation("quickTest", "linux")))
            .build()
            .unwrap();
        let mut orchestrator = orchestrator(
            pipeline,
            config(&[("linux", "http://ci/job/Worker")]),
            &remote,
        );

        let report = orchestrator.run(&["commitStage"], "d10e26a2").await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.commit, "d10e26a2");
        let requested = report.requested_stage("commitStage").unwrap();
        assert_eq!(requested.status, StageStatus::Succeeded);
        assert!(requested.cause.is_none());

        let stage = report.stage("commitStage").unwrap();
        assert_eq!(stage.invocations.len(), 1);
        let invocation = &stage.invocations[0];
        assert_eq!(invocation.status, InvocationStatus::Succeeded);
        assert_eq!(invocation.build_number, Some(6));
        assert_eq!(invocation.reference.as_deref(), Some("http://ci/job/Worker/6/"));
        // Passthrough wiring without a catalog
        assert_eq!(invocation.tasks, vec!["test"]);
        assert_eq!(
            orchestrator.state().status("commitStage"),
            Some(StageStatus::Succeeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dependency_skips_dependent() {
        let remote = Arc::new(
            FakeRemote::default()
                .job("http://ci/job/A", Some(1), "FAILURE", 2)
                .job("http://ci/job/B", Some(1), "SUCCESS", 0),
        );
        let pipeline = Pipeline::builder()
            .stage(Stage::new("A", "").with_invocation(invocation("compileAll", "env-a")))
            .stage(
                Stage::new("B", "")
                    .depends_on("A")
                    .with_invocation(invocation("quickTest", "env-b")),
            )
            .build()
            .unwrap();
        let (tx, mut rx) = channel();
        let mut orchestrator = orchestrator(
            pipeline,
            config(&[("env-a", "http://ci/job/A"), ("env-b", "http://ci/job/B")]),
            &remote,
        )
        .with_events(tx);

        let report = orchestrator.run(&["B"], "abc").await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.stage("A").unwrap().status, StageStatus::Failed);
        assert_eq!(report.stage("B").unwrap().status, StageStatus::Skipped);
        assert!(report.stage("B").unwrap().invocations.is_empty());
        assert_eq!(remote.calls_for("http://ci/job/B"), 0);

        let b = report.requested_stage("B").unwrap();
        assert_eq!(b.status, StageStatus::Skipped);
        let cause = b.cause.as_ref().unwrap();
        assert_eq!(cause.stage, "A");
        assert_eq!(cause.kind, "invocation_failed");
        assert_eq!(cause.build_number, Some(2));
        assert_eq!(cause.reference.as_deref(), Some("http://ci/job/A/2/"));

        let mut skipped = None;
        while let Ok(message) = rx.try_recv() {
            if let AppEvent::Stage(StageEvent::Skipped {
                stage,
                failed_dependency,
            }) = message.event
            {
                skipped = Some((stage, failed_dependency));
            }
        }
        assert_eq!(skipped, Some(("B".to_string(), "A".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dependency_skips_transitively() {
        let remote = Arc::new(
            FakeRemote::default()
                .job("http://ci/job/A", Some(4), "FAILURE", 1)
                .job("http://ci/job/B", Some(1), "SUCCESS", 0)
                .job("http://ci/job/C", Some(1), "SUCCESS", 0),
        );
        let pipeline = Pipeline::builder()
            .stage(Stage::new("A", "").with_invocation(invocation("compileAll", "env-a")))
            .stage(
                Stage::new("B", "")
                    .depends_on("A")
                    .with_invocation(invocation("quickTest", "env-b")),
            )
            .stage(
                Stage::new("C", "")
                    .depends_on("B")
                    .with_invocation(invocation("platformTest", "env-c")),
            )
            .build()
            .unwrap();
        let (tx, mut rx) = channel();
        let mut orchestrator = orchestrator(
            pipeline,
            config(&[
                ("env-a", "http://ci/job/A"),
                ("env-b", "http://ci/job/B"),
                ("env-c", "http://ci/job/C"),
            ]),
            &remote,
        )
        .with_events(tx);

        let report = orchestrator.run(&["C"], "abc").await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.stage("A").unwrap().status, StageStatus::Failed);
        assert_eq!(report.stage("B").unwrap().status, StageStatus::Skipped);
        assert_eq!(report.stage("C").unwrap().status, StageStatus::Skipped);
        assert_eq!(remote.calls_for("http://ci/job/B"), 0);
        assert_eq!(remote.calls_for("http://ci/job/C"), 0);
        assert_eq!(remote.triggers(), ["http://ci/job/A"]);

        let c = report.requested_stage("C").unwrap();
        assert_eq!(c.status, StageStatus::Skipped);
        let cause = c.cause.as_ref().unwrap();
        assert_eq!(cause.stage, "A");
        assert_eq!(cause.build_number, Some(5));

        let mut skipped = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let AppEvent::Stage(StageEvent::Skipped {
                stage,
                failed_dependency,
            }) = message.event
            {
                skipped.push((stage, failed_dependency));
            }
        }
        assert_eq!(
            skipped,
            [
                ("B".to_string(), "A".to_string()),
                ("C".to_string(), "B".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_invocation_fails_stage() {
        // No job registered for the URL, so the invocation task panics
        let remote = Arc::new(FakeRemote::default());
        let pipeline = Pipeline::builder()
            .stage(Stage::new("A", "").with_invocation(invocation("compileAll", "env-a")))
            .stage(
                Stage::new("B", "")
                    .depends_on("A")
                    .with_invocation(invocation("quickTest", "env-a")),
            )
            .build()
            .unwrap();
        let (tx, mut rx) = channel();
        let mut orchestrator =
            orchestrator(pipeline, config(&[("env-a", "http://ci/job/Gone")]), &remote)
                .with_events(tx);

        let report = orchestrator.run(&["B"], "abc").await.unwrap();

        let a = report.stage("A").unwrap();
        assert_eq!(a.status, StageStatus::Failed);
        assert_eq!(a.invocations[0].status, InvocationStatus::RemoteError);
        assert_eq!(report.stage("B").unwrap().status, StageStatus::Skipped);

        let mut failed = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let AppEvent::Stage(StageEvent::Failed {
                stage,
                invocation,
                error,
                ..
            }) = message.event
            {
                failed.push((stage, invocation, error));
            }
        }
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "A");
        assert_eq!(failed[0].1, "compileAll on env-a");
        assert!(failed[0].2.contains("did not complete"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_stage_makes_no_calls() {
        let remote = Arc::new(FakeRemote::default().job("http://ci/job/Worker", None, "SUCCESS", 0));
        let pipeline = Pipeline::builder()
            .stage(Stage::new("commitStage", "").with_invocation(invocation("quickTest", "linux")))
            .build()
            .unwrap();
        let mut orchestrator = orchestrator(
            pipeline,
            config(&[("linux", "http://ci/job/Worker")]),
            &remote,
        );

        let err = orchestrator
            .run(&["commitStage", "nonexistent"], "abc")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::UnknownStage { ref name }) if name == "nonexistent"
        ));
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_job_url_makes_no_calls() {
        let remote = Arc::new(FakeRemote::default().job("http://ci/job/Worker", None, "SUCCESS", 0));
        let pipeline = Pipeline::builder()
            .stage(Stage::new("s1", "").with_invocation(invocation("quickTest", "linux")))
            .stage(Stage::new("s2", "").with_invocation(invocation("quickTest", "windows")))
            .build()
            .unwrap();
        let mut orchestrator = orchestrator(
            pipeline,
            config(&[("linux", "http://ci/job/Worker")]),
            &remote,
        );

        let err = orchestrator.run(&["s1", "s2"], "abc").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingJobUrl { ref environment }) if environment == "windows"
        ));
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependencies_run_first() {
        let remote = Arc::new(
            FakeRemote::default()
                .job("http://ci/job/A", Some(1), "SUCCESS", 3)
                .job("http://ci/job/B", Some(1), "SUCCESS", 0),
        );
        let pipeline = Pipeline::builder()
            .stage(Stage::new("A", "").with_invocation(invocation("compileAll", "env-a")))
            .stage(
                Stage::new("B", "")
                    .depends_on("A")
                    .with_invocation(invocation("quickTest", "env-b")),
            )
            .build()
            .unwrap();
        let mut orchestrator = orchestrator(
            pipeline,
            config(&[("env-a", "http://ci/job/A"), ("env-b", "http://ci/job/B")]),
            &remote,
        );

        let report = orchestrator.run(&["B"], "abc").await.unwrap();
        assert!(report.is_success());
        assert_eq!(
            remote.triggers(),
            vec!["http://ci/job/A".to_string(), "http://ci/job/B".to_string()]
        );
        // A's plan position precedes B's in the report as well
        let names: Vec<_> = report.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_invocation_cancelled_after_failure() {
        // Both builds fail so the outcome does not depend on which invocation
        // gets the single permit first
        let remote = Arc::new(
            FakeRemote::default()
                .job("http://ci/job/X", Some(1), "FAILURE", 0)
                .job("http://ci/job/Y", Some(1), "FAILURE", 0),
        );
        let pipeline = Pipeline::builder()
            .stage(
                Stage::new("S", "")
                    .with_invocation(invocation("first", "env-x"))
                    .with_invocation(invocation("second", "env-y")),
            )
            .build()
            .unwrap();
        let mut config = config(&[("env-x", "http://ci/job/X"), ("env-y", "http://ci/job/Y")]);
        config.execution.max_concurrent_invocations = 1;
        let mut orchestrator = orchestrator(pipeline, config, &remote);

        let report = orchestrator.run(&["S"], "abc").await.unwrap();

        let stage = report.stage("S").unwrap();
        assert_eq!(stage.status, StageStatus::Failed);
        let statuses: Vec<_> = stage.invocations.iter().map(|inv| inv.status).collect();
        assert_eq!(
            statuses.iter().filter(|s| **s == InvocationStatus::Failed).count(),
            1
        );
        assert_eq!(
            statuses.iter().filter(|s| **s == InvocationStatus::Cancelled).count(),
            1
        );
        // Fan-out order is kept in the report
        assert!(stage.invocations[0].label.starts_with("first"));
        assert_eq!(remote.triggers().len(), 1);

        let cause = report.requested_stage("S").unwrap().cause.as_ref().unwrap();
        assert_eq!(cause.stage, "S");
        assert_eq!(cause.kind, "invocation_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_stages_overlap() {
        let remote = Arc::new(
            FakeRemote::default()
                .job("http://ci/job/P", Some(1), "SUCCESS", 4)
                .job("http://ci/job/Q", Some(1), "SUCCESS", 4),
        );
        let pipeline = Pipeline::builder()
            .stage(Stage::new("P", "").with_invocation(invocation("quickTest", "env-p")))
            .stage(Stage::new("Q", "").with_invocation(invocation("quickTest", "env-q")))
            .build()
            .unwrap();
        let mut orchestrator = orchestrator(
            pipeline,
            config(&[("env-p", "http://ci/job/P"), ("env-q", "http://ci/job/Q")]),
            &remote,
        );

        let started = Instant::now();
        let report = orchestrator.run(&["P", "Q"], "abc").await.unwrap();
        assert!(report.is_success());

        // Each stage alone takes 500ms to start plus 4 x 500ms of polling
        assert!(started.elapsed() < Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_targets_counts_as_success() {
        let remote = Arc::new(FakeRemote::default().job("http://ci/job/Worker", Some(1), "SUCCESS", 0));
        let pipeline = Pipeline::builder()
            .stage(Stage::new("lint", "").with_invocation(invocation("ktlint", "linux")))
            .build()
            .unwrap();
        let mut config = config(&[("linux", "http://ci/job/Worker")]);
        config.fanout.subunits = vec!["core".into()];
        config.catalog = vec![SubunitConfig {
            name: "core".into(),
            tasks: vec!["compileJava".into()],
        }];
        let mut orchestrator = orchestrator(pipeline, config, &remote);

        let report = orchestrator.run(&["lint"], "abc").await.unwrap();

        assert!(report.is_success());
        assert_eq!(
            report.stage("lint").unwrap().invocations[0].status,
            InvocationStatus::NoTargets
        );
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_rejected_before_calls() {
        let remote = Arc::new(FakeRemote::default());
        let pipeline = Pipeline::builder()
            .stage(Stage::new("a", "").depends_on("b"))
            .stage(Stage::new("b", "").depends_on("a"))
            .build()
            .unwrap();
        let mut orchestrator = orchestrator(pipeline, Config::default(), &remote);

        let err = orchestrator.run(&["a"], "abc").await.unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(err.to_string(), "pipeline error: cyclic dependency: a -> b -> a");
        assert_eq!(remote.total_calls(), 0);
    }

    #[test]
    fn test_prepare_checks_without_calls() {
        let remote = Arc::new(FakeRemote::default());
        let pipeline = Pipeline::builder()
            .stage(Stage::new("A", "").with_invocation(invocation("compileAll", "env-a")))
            .stage(
                Stage::new("B", "")
                    .depends_on("A")
                    .with_invocation(invocation("quickTest", "env-b")),
            )
            .build()
            .unwrap();
        let mut config = config(&[("env-a", "http://ci/job/A")]);
        config.remote.default_job_url = Some("http://ci/job/Default/".into());
        let orchestrator = orchestrator(pipeline, config, &remote);

        let run_plan = orchestrator.prepare(&["B"]).unwrap();

        assert_eq!(run_plan.plan.len(), 2);
        assert_eq!(run_plan.jobs["env-a"], "http://ci/job/A");
        assert_eq!(run_plan.jobs["env-b"], "http://ci/job/Default");
        assert_eq!(run_plan.wiring.targets_for("B", 0), ["test".to_string()]);
        assert_eq!(remote.total_calls(), 0);
    }

    fn status() -> impl Strategy<Value = InvocationStatus> {
        prop_oneof![
            Just(InvocationStatus::Succeeded),
            Just(InvocationStatus::Failed),
            Just(InvocationStatus::TriggerTimeout),
            Just(InvocationStatus::RunTimeout),
            Just(InvocationStatus::RemoteError),
            Just(InvocationStatus::Cancelled),
            Just(InvocationStatus::NoTargets),
        ]
    }

    proptest! {
        #[test]
        fn aggregate_is_order_independent(
            outcomes in prop::collection::vec(status(), 0..8),
            seed in any::<u64>(),
        ) {
            let mut shuffled = outcomes.clone();
            // Deterministic rotation and reversal driven by the seed
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left(usize::try_from(seed % len as u64).unwrap());
            }
            if seed % 2 == 0 {
                shuffled.reverse();
            }

            prop_assert_eq!(aggregate(outcomes.clone()), aggregate(shuffled));
            prop_assert_eq!(
                aggregate(outcomes.clone()).is_success(),
                outcomes.iter().all(|o| o.is_success())
            );
        }
    }
}
