//! Pipeline graph and planning error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum PipelineError {
    #[error("unknown stage: {name}")]
    UnknownStage { name: String },

    #[error("stage {stage} depends on unknown stage {dependency}")]
    UnknownDependency { stage: String, dependency: String },

    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("stage defined more than once: {name}")]
    DuplicateStage { name: String },

    #[error("execution unit {unit} claimed by both {existing} and {stage}")]
    ExecutionUnitCollision {
        unit: String,
        existing: String,
        stage: String,
    },

    #[error("task {task} not found in sub-unit {subunit}")]
    UnknownTask { subunit: String, task: String },

    #[error("invalid pipeline definition: {message}")]
    InvalidDefinition { message: String },
}

impl UserFacingError for PipelineError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownStage { .. } => Some("Check the requested stage names against the pipeline definition."),
            Self::CyclicDependency { .. } => {
                Some("Remove one of the dependencies listed in the cycle.")
            }
            Self::ExecutionUnitCollision { .. } => {
                Some("Rename one of the stages; names must stay unique once whitespace is removed.")
            }
            Self::UnknownTask { .. } => {
                Some("Declare the task in the sub-unit catalog or fix the build type's task list.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnknownStage { .. } => "pipeline.unknown_stage",
            Self::UnknownDependency { .. } => "pipeline.unknown_dependency",
            Self::CyclicDependency { .. } => "pipeline.cyclic_dependency",
            Self::DuplicateStage { .. } => "pipeline.duplicate_stage",
            Self::ExecutionUnitCollision { .. } => "pipeline.execution_unit_collision",
            Self::UnknownTask { .. } => "pipeline.unknown_task",
            Self::InvalidDefinition { .. } => "pipeline.invalid_definition",
        };
        Some(code)
    }
}
