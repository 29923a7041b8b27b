#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for dstage
//!
//! The pipeline model (environments, build types, invocations, stages) is
//! built once and never mutated. Run-time status and reports live in
//! separate types so that execution state is never stored on the graph.

pub mod model;
pub mod reports;
pub mod status;

pub use model::{
    BuildEnvironment, BuildInvocation, BuildType, Pipeline, PipelineBuilder, Stage,
    EXECUTION_UNIT_PREFIX, TASK_PATH_SEPARATOR,
};
pub use reports::{FailureCause, InvocationReport, RequestedStageReport, RunReport, StageReport};
pub use status::{InvocationStatus, StageStatus};

use serde::{Deserialize, Serialize};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    #[default]
    Tty,
    Json,
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    #[default]
    Auto,
    Never,
}

// Implement clap::ValueEnum for ColorChoice
impl clap::ValueEnum for ColorChoice {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Always, Self::Auto, Self::Never]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Always => clap::builder::PossibleValue::new("always"),
            Self::Auto => clap::builder::PossibleValue::new("auto"),
            Self::Never => clap::builder::PossibleValue::new("never"),
        })
    }
}
