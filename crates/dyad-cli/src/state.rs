//! Application state wiring configuration, catalog and backends together.

use std::path::PathBuf;

use anyhow::Context;

use dyad_core::dialogue::SessionBackends;
use dyad_infra::catalog::JsonCatalog;
use dyad_infra::config::load_simulation_config;
use dyad_infra::llm::{EnvProviderResolver, build_backends};
use dyad_infra::session_log::JsonSessionLog;
use dyad_types::config::SimulationConfig;

use crate::cli::SessionInputs;

/// Everything a session run needs, loaded once per process.
///
/// Immutable after `init`, so batch workers share it through an `Arc`.
pub struct AppState {
    pub config: SimulationConfig,
    pub catalog: JsonCatalog,
    pub backends: SessionBackends,
    pub session_log: JsonSessionLog,
}

impl AppState {
    /// Load config and catalog, then build provider chains from the environment.
    pub async fn init(inputs: &SessionInputs) -> anyhow::Result<Self> {
        let mut config = load_simulation_config(&inputs.config)
            .await
            .with_context(|| format!("Failed to load config {}", inputs.config.display()))?;
        if let Some(max_turns) = inputs.max_turns {
            config.engine.max_turns = max_turns;
            config.validate()?;
        }

        let catalog = JsonCatalog::load(&inputs.catalog)
            .await
            .with_context(|| format!("Failed to load catalog {}", inputs.catalog.display()))?;

        let backends = build_backends(&config, &EnvProviderResolver).context("Failed to build model backends")?;

        let log_dir = inputs
            .log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.batch.log_dir));

        Ok(Self {
            config,
            catalog,
            backends,
            session_log: JsonSessionLog::new(log_dir),
        })
    }
}
