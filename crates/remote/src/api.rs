//! Remote job API seam

use async_trait::async_trait;
use dstage_errors::Error;

/// State of one remote build as reported by its status document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildStatus {
    /// Whether the build is still running
    pub building: bool,
    /// Final result (`SUCCESS`, `FAILURE`, `ABORTED`, ...), once known
    pub result: Option<String>,
    /// Link to the build for humans
    pub url: Option<String>,
}

impl BuildStatus {
    /// Whether a finished build counts as a success.
    ///
    /// A build that reports no result is treated as successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.as_deref().is_none_or(|result| result == "SUCCESS")
    }
}

/// Operations the trigger/poll protocol needs from a remote build server.
///
/// `job` is the job's base URL.
#[async_trait]
pub trait RemoteJobApi: Send + Sync {
    /// Number of the most recent build, `None` when the job never ran
    async fn last_build_number(&self, job: &str) -> Result<Option<u64>, Error>;

    /// Start the job with the given tasks and commit; does not wait
    async fn trigger(&self, job: &str, tasks: &[String], commit: &str) -> Result<(), Error>;

    /// Current status of build `number`
    async fn build_status(&self, job: &str, number: u64) -> Result<BuildStatus, Error>;
}
