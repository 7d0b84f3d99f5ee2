//! dyad command-line entry point.
//!
//! Binary name: `dyad`
//!
//! Parses CLI arguments, sets up tracing, loads configuration and catalog,
//! then dispatches to the command handler.

mod cli;
mod state;

use std::sync::Arc;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,dyad_core=debug,dyad_infra=debug",
        _ => "trace",
    };
    dyad_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let outcome = dispatch(cli).await;
    dyad_observe::tracing_setup::shutdown_tracing();
    outcome
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            inputs,
            character,
            scenario,
            situation,
        } => {
            let state = AppState::init(&inputs).await?;
            cli::run::run_session(&state, &character, &scenario, &situation, cli.json, cli.quiet).await
        }

        Commands::Batch {
            inputs,
            workers,
            character,
        } => {
            let state = Arc::new(AppState::init(&inputs).await?);
            cli::batch::run_batch(state, workers, character.as_deref(), cli.json, cli.quiet).await
        }

        Commands::CheckConfig { config } => cli::check::check_config(&config, cli.json).await,
    }
}
