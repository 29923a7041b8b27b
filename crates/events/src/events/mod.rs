use serde::{Deserialize, Serialize};

use crate::EventSource;
use dstage_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureContext {
    /// Stable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod general;
pub mod invocation;
pub mod plan;
pub mod stage;

pub use general::*;
pub use invocation::*;
pub use plan::*;
pub use stage::*;

/// Top-level application event enum that aggregates all domain events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Planning events (closure, wiring)
    Plan(PlanEvent),

    /// Stage lifecycle events
    Stage(StageEvent),

    /// Remote invocation events (trigger, poll, completion)
    Invocation(InvocationEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Plan(_) => EventSource::PLANNER,
            Self::Stage(_) => EventSource::STAGE,
            Self::Invocation(_) => EventSource::INVOCATION,
        }
    }

    /// Stage the event belongs to, if any
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage(event) => Some(event.stage()),
            Self::Invocation(event) => Some(event.stage()),
            Self::General(_) | Self::Plan(_) => None,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. })
            | Self::Stage(StageEvent::Failed { .. })
            | Self::Invocation(InvocationEvent::Failed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Stage(StageEvent::Skipped { .. })
            | Self::Invocation(
                InvocationEvent::Cancelled { .. } | InvocationEvent::NoTargets { .. },
            ) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Stage(StageEvent::Waiting { .. })
            | Self::Plan(PlanEvent::Wired { .. }) => Level::DEBUG,

            Self::Invocation(InvocationEvent::Polled { .. }) => Level::TRACE,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "dstage::events::general",
            Self::Plan(_) => "dstage::events::plan",
            Self::Stage(_) => "dstage::events::stage",
            Self::Invocation(_) => "dstage::events::invocation",
        }
    }

    /// One-line human readable description, used for tracing output
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::General(event) => event.summary(),
            Self::Plan(event) => event.summary(),
            Self::Stage(event) => event.summary(),
            Self::Invocation(event) => event.summary(),
        }
    }
}
