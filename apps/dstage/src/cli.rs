//! Command line interface definition

use clap::{Args, Parser, Subcommand};
use dstage_types::ColorChoice;
use std::path::PathBuf;

/// dstage - run pipeline stages as remote builds
#[derive(Parser)]
#[command(name = "dstage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run pipeline stages as remote builds, in dependency order")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Trigger the requested stages and everything they depend on
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Commit id passed to every remote build
        #[arg(long, env = "DSTAGE_COMMIT")]
        commit: String,

        #[command(flatten)]
        overrides: RunOverrides,
    },

    /// Show the execution plan without triggering anything
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Which pipeline and which stages
#[derive(Args)]
pub struct TargetArgs {
    /// Pipeline definition file (TOML)
    #[arg(long, short, env = "DSTAGE_PIPELINE", value_name = "PATH")]
    pub pipeline: PathBuf,

    /// Stages to run
    #[arg(required = true, value_name = "STAGE")]
    pub stages: Vec<String>,
}

/// Per-run configuration overrides (highest precedence)
#[derive(Args, Default)]
pub struct RunOverrides {
    /// Maximum number of invocations in flight at once
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Delay between two polls of the build server
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Fallback job URL for environments without their own
    #[arg(long, value_name = "URL")]
    pub job_url: Option<String>,
}
