//! Output rendering and formatting

use crate::events::format_duration;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use dstage_executor::RunPlan;
use dstage_types::{InvocationStatus, RunReport, StageStatus};
use serde_json::json;
use std::io;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    colors_enabled: bool,
}

impl OutputRenderer {
    pub fn new(json_output: bool, colors_enabled: bool) -> Self {
        Self {
            json_output,
            colors_enabled,
        }
    }

    /// Render the final report of a run
    pub fn render_report(&self, report: &RunReport) -> io::Result<()> {
        if self.json_output {
            let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        println!("{}", self.stage_table(report));
        for requested in &report.requested {
            if let Some(cause) = &requested.cause {
                let mut line = format!(
                    "{} {}: {} in {} ({}): {}",
                    requested.name,
                    requested.status.to_string().to_lowercase(),
                    cause.kind,
                    cause.stage,
                    cause.invocation,
                    cause.message
                );
                if let Some(reference) = &cause.reference {
                    line.push_str(" - ");
                    line.push_str(reference);
                }
                println!("{line}");
            }
        }

        let verdict = if report.is_success() {
            "All requested stages succeeded"
        } else {
            "Some requested stages did not succeed"
        };
        println!(
            "{verdict} (commit {}, {})",
            report.commit,
            format_duration(report.duration_ms)
        );
        Ok(())
    }

    fn stage_table(&self, report: &RunReport) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !self.colors_enabled {
            table.force_no_tty();
        }

        table.set_header(vec![
            Cell::new("Stage").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Duration").add_attribute(Attribute::Bold),
            Cell::new("Invocations").add_attribute(Attribute::Bold),
        ]);

        for stage in &report.stages {
            let invocations = stage
                .invocations
                .iter()
                .map(|inv| {
                    let mut line = format!("{}: {}", inv.label, inv.status);
                    if inv.status != InvocationStatus::NoTargets {
                        if let Some(reference) = &inv.reference {
                            line.push_str(" - ");
                            line.push_str(reference);
                        }
                    }
                    line
                })
                .collect::<Vec<_>>()
                .join("\n");

            table.add_row(vec![
                Cell::new(&stage.name),
                self.status_cell(stage.status),
                Cell::new(format_duration(stage.duration_ms)),
                Cell::new(invocations),
            ]);
        }
        table
    }

    fn status_cell(&self, status: StageStatus) -> Cell {
        let cell = Cell::new(status.to_string());
        if !self.colors_enabled {
            return cell;
        }
        match status {
            StageStatus::Succeeded => cell.fg(Color::Green),
            StageStatus::Failed => cell.fg(Color::Red).add_attribute(Attribute::Bold),
            StageStatus::Skipped => cell.fg(Color::Yellow),
            StageStatus::Pending | StageStatus::Running => cell,
        }
    }

    /// Render a plan computed without triggering anything
    pub fn render_plan(&self, run_plan: &RunPlan) -> io::Result<()> {
        let plan = &run_plan.plan;

        if self.json_output {
            let stages: Vec<_> = plan
                .stages()
                .iter()
                .map(|stage| {
                    let invocations: Vec<_> = stage
                        .build_invocations
                        .iter()
                        .enumerate()
                        .map(|(idx, invocation)| {
                            json!({
                                "label": invocation.label(),
                                "environment": invocation.environment.name,
                                "job": run_plan.jobs.get(&invocation.environment.name),
                                "tasks": run_plan.wiring.targets_for(&stage.name, idx),
                            })
                        })
                        .collect();
                    json!({
                        "name": stage.name,
                        "dependencies": plan.dependencies_of(&stage.name),
                        "invocations": invocations,
                    })
                })
                .collect();
            let value = json!({
                "requested": plan.requested(),
                "batches": plan.batches(),
                "stages": stages,
                "additional_units": run_plan.wiring.additional_units(),
            });
            let json = serde_json::to_string_pretty(&value).map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        for (wave, batch) in plan.batches().iter().enumerate() {
            println!("Wave {}: {}", wave + 1, batch.join(", "));
        }
        println!();
        for stage in plan.stages() {
            let dependencies = plan.dependencies_of(&stage.name);
            if dependencies.is_empty() {
                println!("{}", stage.name);
            } else {
                println!("{} (after {})", stage.name, dependencies.join(", "));
            }
            for (idx, invocation) in stage.build_invocations.iter().enumerate() {
                let tasks = run_plan.wiring.targets_for(&stage.name, idx);
                let job = run_plan
                    .jobs
                    .get(&invocation.environment.name)
                    .map_or("-", String::as_str);
                if tasks.is_empty() {
                    println!("  {} -> no targets", invocation.label());
                } else {
                    println!("  {} -> {job}: {}", invocation.label(), tasks.join(" "));
                }
            }
        }
        Ok(())
    }
}
