//! Integration tests for error types

#[cfg(test)]
mod tests {
    use dstage_errors::*;

    #[test]
    fn test_error_conversion() {
        let err: Error = PipelineError::UnknownStage {
            name: "nonexistent".into(),
        }
        .into();
        assert!(matches!(err, Error::Pipeline(_)));
        assert!(err.is_configuration_error());

        let err: Error = InvocationError::RunTimeout {
            job: "http://ci/job/worker".into(),
            build: 7,
            waited_ms: 1000,
        }
        .into();
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_cycle_display() {
        let err = PipelineError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_invocation_kinds() {
        let failed = InvocationError::Failed {
            job: "job".into(),
            build: 6,
            result: "FAILURE".into(),
            url: "http://ci/job/6/".into(),
        };
        assert_eq!(failed.kind(), "invocation_failed");
        assert!(!failed.is_retryable());

        let timeout = InvocationError::TriggerTimeout {
            job: "job".into(),
            baseline: Some(5),
            waited_ms: 10,
        };
        assert_eq!(timeout.kind(), "trigger_timeout");
        assert!(timeout.is_retryable());
    }

    #[test]
    fn test_user_codes_delegate() {
        let err: Error = ConfigError::MissingJobUrl {
            environment: "linux".into(),
        }
        .into();
        assert_eq!(err.user_code(), Some("config.missing_job_url"));
        assert!(err.user_hint().is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }
}
