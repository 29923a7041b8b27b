#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for dstage
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/dstage/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)
//!
//! It also loads pipeline definition files into the immutable
//! [`dstage_types::Pipeline`] graph.

pub mod pipeline;

pub use pipeline::{
    BuildTypeDefinition, EnvironmentDefinition, InvocationDefinition, PipelineDefinition,
    StageDefinition,
};

use dstage_errors::{ConfigError, Error};
use dstage_types::{ColorChoice, OutputFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Sub-units and the tasks they declare
    #[serde(default)]
    pub catalog: Vec<SubunitConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

/// Trigger/poll timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Budget for the remote to pick up a triggered job
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,
    /// Budget for a started build to finish
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    /// Hard cap on iterations of any single poll loop
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

/// Stage execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_concurrent_invocations")]
    pub max_concurrent_invocations: usize,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

/// Remote build server job URLs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteConfig {
    /// Used for environments without an entry in `jobs`
    #[serde(default)]
    pub default_job_url: Option<String>,
    /// Environment name -> job base URL
    #[serde(default)]
    pub jobs: BTreeMap<String, String>,
}

/// Sub-units bare task names are resolved against
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FanoutConfig {
    #[serde(default)]
    pub subunits: Vec<String>,
}

/// One sub-unit of the build and the tasks it declares
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubunitConfig {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<String>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            start_timeout_secs: 120,  // 2 minutes for the queue to pick the job up
            run_timeout_secs: 7200,   // 2 hours for the build itself
            max_polls: 100_000,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_invocations: 8,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            retries: 3,
            retry_delay: 1, // 1 second
        }
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_interval_ms() -> u64 {
    500
}

fn default_start_timeout() -> u64 {
    120
}

fn default_run_timeout() -> u64 {
    7200
}

fn default_max_polls() -> u32 {
    100_000
}

fn default_max_concurrent_invocations() -> usize {
    8
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}

impl PollingConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("dstage").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!("no config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // DSTAGE_POLL_INTERVAL_MS
        if let Ok(interval) = std::env::var("DSTAGE_POLL_INTERVAL_MS") {
            self.polling.interval_ms = parse_env("DSTAGE_POLL_INTERVAL_MS", interval)?;
        }

        // DSTAGE_START_TIMEOUT
        if let Ok(timeout) = std::env::var("DSTAGE_START_TIMEOUT") {
            self.polling.start_timeout_secs = parse_env("DSTAGE_START_TIMEOUT", timeout)?;
        }

        // DSTAGE_RUN_TIMEOUT
        if let Ok(timeout) = std::env::var("DSTAGE_RUN_TIMEOUT") {
            self.polling.run_timeout_secs = parse_env("DSTAGE_RUN_TIMEOUT", timeout)?;
        }

        // DSTAGE_MAX_CONCURRENT
        if let Ok(max) = std::env::var("DSTAGE_MAX_CONCURRENT") {
            self.execution.max_concurrent_invocations = parse_env("DSTAGE_MAX_CONCURRENT", max)?;
        }

        // DSTAGE_DEFAULT_JOB_URL
        if let Ok(url) = std::env::var("DSTAGE_DEFAULT_JOB_URL") {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "DSTAGE_DEFAULT_JOB_URL".to_string(),
                    value: url,
                }
                .into());
            }
            self.remote.default_job_url = Some(url);
        }

        // DSTAGE_OUTPUT
        if let Ok(output) = std::env::var("DSTAGE_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "DSTAGE_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // DSTAGE_COLOR
        if let Ok(color) = std::env::var("DSTAGE_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "DSTAGE_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        Ok(())
    }

    /// Reject values that would make polling or scheduling degenerate
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero interval, timeout,
    /// poll cap or concurrency limit.
    pub fn validate(&self) -> Result<(), Error> {
        let checks: [(&str, u64); 5] = [
            ("polling.interval_ms", self.polling.interval_ms),
            ("polling.start_timeout_secs", self.polling.start_timeout_secs),
            ("polling.run_timeout_secs", self.polling.run_timeout_secs),
            ("polling.max_polls", u64::from(self.polling.max_polls)),
            (
                "execution.max_concurrent_invocations",
                self.execution.max_concurrent_invocations as u64,
            ),
        ];

        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Job base URL for an environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingJobUrl` when neither a per-environment
    /// entry nor a default URL is configured.
    pub fn job_url_for(&self, environment: &str) -> Result<String, ConfigError> {
        self.remote
            .jobs
            .get(environment)
            .or(self.remote.default_job_url.as_ref())
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| ConfigError::MissingJobUrl {
                environment: environment.to_string(),
            })
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}
