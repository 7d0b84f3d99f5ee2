//! CLI command definitions for the `dyad` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod batch;
pub mod check;
pub mod run;
pub mod summary;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Simulate dialogues between an LLM-played persona and an LLM partner.
#[derive(Parser)]
#[command(name = "dyad", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Inputs shared by commands that run sessions.
#[derive(Args, Debug, Clone)]
pub struct SessionInputs {
    /// Simulation configuration file.
    #[arg(long, short, default_value = "dyad.toml", env = "DYAD_CONFIG")]
    pub config: PathBuf,

    /// Character and scenario catalog.
    #[arg(long, default_value = "catalog.json", env = "DYAD_CATALOG")]
    pub catalog: PathBuf,

    /// Directory for session logs (overrides `batch.log_dir`).
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Override `engine.max_turns`.
    #[arg(long)]
    pub max_turns: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single session and write its log.
    Run {
        #[command(flatten)]
        inputs: SessionInputs,

        /// Character id from the catalog.
        #[arg(long)]
        character: String,

        /// Scenario id.
        #[arg(long)]
        scenario: String,

        /// Situation id within the scenario.
        #[arg(long)]
        situation: String,
    },

    /// Run every catalog test case on a bounded worker pool.
    Batch {
        #[command(flatten)]
        inputs: SessionInputs,

        /// Concurrent sessions (overrides `batch.max_workers`).
        #[arg(long, short)]
        workers: Option<usize>,

        /// Only run test cases for this character.
        #[arg(long)]
        character: Option<String>,
    },

    /// Validate a configuration file and print the resolved settings.
    #[command(name = "check-config")]
    CheckConfig {
        /// Simulation configuration file.
        #[arg(long, short, default_value = "dyad.toml", env = "DYAD_CONFIG")]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_command() {
        let cli = Cli::try_parse_from([
            "dyad",
            "run",
            "--config",
            "sim.toml",
            "--character",
            "anxious_01",
            "--scenario",
            "communication",
            "--situation",
            "ignored_messages",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                inputs, character, ..
            } => {
                assert_eq!(inputs.config, PathBuf::from("sim.toml"));
                assert_eq!(inputs.catalog, PathBuf::from("catalog.json"));
                assert_eq!(character, "anxious_01");
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parses_batch_with_workers_and_verbosity() {
        let cli = Cli::try_parse_from(["dyad", "-vv", "batch", "--workers", "8"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Batch { workers: Some(8), .. }));
    }

    #[test]
    fn run_requires_situation() {
        let result = Cli::try_parse_from(["dyad", "run", "--character", "a", "--scenario", "b"]);
        assert!(result.is_err());
    }
}
