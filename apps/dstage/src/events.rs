//! Event handling and progress display

use console::{Style, Term};
use dstage_events::{
    AppEvent, EventMessage, GeneralEvent, InvocationEvent, PlanEvent, StageEvent,
};

/// Renders run events as they arrive
pub struct EventHandler {
    term: Term,
    /// Print debug events and per-poll progress
    debug_enabled: bool,
    /// Leave rendering to the final JSON report
    quiet: bool,
    styles: Styles,
}

struct Styles {
    stage: Style,
    success: Style,
    failure: Style,
    warning: Style,
    dim: Style,
}

impl Styles {
    fn new(colors_enabled: bool) -> Self {
        let base = Style::new().force_styling(colors_enabled);
        Self {
            stage: base.clone().bold(),
            success: base.clone().green(),
            failure: base.clone().red().bold(),
            warning: base.clone().yellow(),
            dim: base.dim(),
        }
    }
}

impl EventHandler {
    pub fn new(colors_enabled: bool, debug_enabled: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            debug_enabled,
            quiet,
            styles: Styles::new(colors_enabled),
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, message: EventMessage) {
        if self.quiet {
            return;
        }
        if let Some(line) = self.format_event(&message.event) {
            self.show(&line);
        }
    }

    /// One display line per event; `None` hides the event
    fn format_event(&self, event: &AppEvent) -> Option<String> {
        match event {
            AppEvent::General(event) => self.format_general(event),
            AppEvent::Plan(event) => self.format_plan(event),
            AppEvent::Stage(event) => Some(self.format_stage(event)),
            AppEvent::Invocation(event) => self.format_invocation(event),
        }
    }

    fn format_general(&self, event: &GeneralEvent) -> Option<String> {
        match event {
            GeneralEvent::Warning { .. } => {
                Some(self.styles.warning.apply_to(event.summary()).to_string())
            }
            GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. } => {
                Some(self.styles.failure.apply_to(event.summary()).to_string())
            }
            _ if self.debug_enabled => Some(self.styles.dim.apply_to(event.summary()).to_string()),
            _ => None,
        }
    }

    fn format_plan(&self, event: &PlanEvent) -> Option<String> {
        match event {
            PlanEvent::Computed { batches, .. } => {
                let waves = batches
                    .iter()
                    .map(|batch| batch.join(", "))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                Some(format!("{} [{waves}]", event.summary()))
            }
            PlanEvent::Wired { .. } if self.debug_enabled => {
                Some(self.styles.dim.apply_to(event.summary()).to_string())
            }
            PlanEvent::Wired { .. } => None,
        }
    }

    fn format_stage(&self, event: &StageEvent) -> String {
        let stage = self.styles.stage.apply_to(event.stage());
        match event {
            StageEvent::Waiting { dependencies, .. } => {
                format!("{stage} waiting for {}", dependencies.join(", "))
            }
            StageEvent::Started {
                description,
                invocations,
                ..
            } => {
                if description.is_empty() {
                    format!("{stage} started ({invocations} invocation(s))")
                } else {
                    format!("{stage} started ({invocations} invocation(s)): {description}")
                }
            }
            StageEvent::Succeeded { duration_ms, .. } => format!(
                "{stage} {} in {}",
                self.styles.success.apply_to("succeeded"),
                format_duration(*duration_ms)
            ),
            StageEvent::Failed {
                invocation, error, ..
            } => format!(
                "{stage} {}: {invocation}: {error}",
                self.styles.failure.apply_to("failed")
            ),
            StageEvent::Skipped {
                failed_dependency, ..
            } => format!(
                "{stage} {}, {failed_dependency} did not succeed",
                self.styles.warning.apply_to("skipped")
            ),
        }
    }

    fn format_invocation(&self, event: &InvocationEvent) -> Option<String> {
        let line = match event {
            InvocationEvent::Polled { .. } if !self.debug_enabled => return None,
            InvocationEvent::Polled { .. } => self.styles.dim.apply_to(event.summary()).to_string(),
            InvocationEvent::Completed {
                invocation,
                reference,
                ..
            } => format!(
                "{} - {invocation} - {reference}",
                self.styles.success.apply_to("Finished")
            ),
            InvocationEvent::Failed {
                invocation,
                failure,
                reference,
                ..
            } => {
                let mut line = format!(
                    "{} - {invocation} - {}",
                    self.styles.failure.apply_to("Failed"),
                    failure.message
                );
                if let Some(reference) = reference {
                    line.push_str(" - ");
                    line.push_str(reference);
                }
                line
            }
            InvocationEvent::Cancelled { .. } | InvocationEvent::NoTargets { .. } => {
                self.styles.warning.apply_to(event.summary()).to_string()
            }
            InvocationEvent::Triggering { .. } | InvocationEvent::Started { .. } => event.summary(),
        };
        Some(format!("  {line}"))
    }

    fn show(&self, line: &str) {
        // Status output is best effort
        let _ = self.term.write_line(line);
    }
}

/// `1234` -> `1.2s`, `75000` -> `1m15s`
pub fn format_duration(duration_ms: u64) -> String {
    let secs = duration_ms / 1000;
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}.{}s", (duration_ms % 1000) / 100)
    }
}
