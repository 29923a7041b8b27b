//! dstage - run pipeline stages as remote builds
//!
//! Thin adapter over the library crates: loads configuration and the
//! pipeline definition, runs the orchestrator and renders its events and
//! final report.

mod cli;
mod display;
mod error;
mod events;

use crate::cli::{Cli, Commands, GlobalArgs, RunOverrides, TargetArgs};
use crate::display::OutputRenderer;
use crate::error::{CliError, EXIT_STAGE_FAILED};
use crate::events::EventHandler;
use clap::Parser;
use dstage_config::{Config, PipelineDefinition};
use dstage_events::EventReceiver;
use dstage_executor::Orchestrator;
use dstage_types::{ColorChoice, RunReport};
use std::future::Future;
use std::process;
use std::sync::Arc;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_STAGE_FAILED),
        Err(e) => {
            error!("Application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic; `Ok(false)` when a requested stage did not succeed
async fn run(cli: Cli) -> Result<bool, CliError> {
    info!("Starting dstage v{}", env!("CARGO_PKG_VERSION"));

    // 1. File config (or defaults), 2. environment, 3. CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    if let Commands::Run { overrides, .. } = &cli.command {
        apply_cli_config(&mut config, &cli.global, overrides);
    } else {
        apply_cli_config(&mut config, &cli.global, &RunOverrides::default());
    }
    config.validate()?;

    let colors_enabled = match config.general.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stdout().features().colors_supported(),
    };
    let renderer = OutputRenderer::new(cli.global.json, colors_enabled);
    let mut event_handler = EventHandler::new(colors_enabled, cli.global.debug, cli.global.json);

    let (event_sender, event_receiver) = dstage_events::channel();

    match cli.command {
        Commands::Plan { target } => {
            let orchestrator =
                Orchestrator::from_config(load_pipeline(&target).await?, config)?
                    .with_events(event_sender);
            let run_plan = orchestrator.prepare(&target.stages)?;
            drop(orchestrator);
            drain_events(event_receiver, &mut event_handler);
            renderer.render_plan(&run_plan)?;
            Ok(true)
        }
        Commands::Run { target, commit, .. } => {
            let mut orchestrator =
                Orchestrator::from_config(load_pipeline(&target).await?, config)?
                    .with_events(event_sender);
            let report = execute_with_events(
                orchestrator.run(&target.stages, &commit),
                event_receiver,
                &mut event_handler,
            )
            .await?;
            renderer.render_report(&report)?;
            info!("Run completed");
            Ok(report.is_success())
        }
    }
}

async fn load_pipeline(target: &TargetArgs) -> Result<Arc<dstage_types::Pipeline>, CliError> {
    let definition = PipelineDefinition::load_from_file(&target.pipeline).await?;
    Ok(Arc::new(definition.into_pipeline()?))
}

/// Drive the run while rendering events as they arrive
async fn execute_with_events<F>(
    run: F,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<RunReport, CliError>
where
    F: Future<Output = Result<RunReport, dstage_errors::Error>>,
{
    let mut run = Box::pin(run);

    loop {
        select! {
            result = &mut run => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result.map_err(CliError::from);
            }

            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* Channel closed: keep waiting for the run to finish */ }
                }
            }
        }
    }
}

fn drain_events(mut event_receiver: EventReceiver, event_handler: &mut EventHandler) {
    while let Ok(event) = event_receiver.try_recv() {
        event_handler.handle_event(event);
    }
}

/// Initialize tracing/logging
///
/// Logs always go to stderr so that stdout only carries the report.
fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let default_filter = match (json_mode, debug_enabled) {
        (_, true) => "warn,dstage=debug",
        (true, false) => "warn,dstage=info",
        // Events are rendered by the handler; keep plain logs to warnings
        (false, false) => "warn",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &GlobalArgs, overrides: &RunOverrides) {
    if let Some(color) = global.color {
        config.general.color = color;
    }
    if let Some(max) = overrides.max_concurrent {
        config.execution.max_concurrent_invocations = max;
    }
    if let Some(interval) = overrides.poll_interval_ms {
        config.polling.interval_ms = interval;
    }
    if let Some(url) = &overrides.job_url {
        config.remote.default_job_url = Some(url.clone());
    }
}
