//! Simulation configuration loader for dyad.
//!
//! Reads a TOML file into [`SimulationConfig`] and validates it. Unlike a
//! long-running service, a simulation run cannot do anything useful with a
//! broken configuration, so every failure here is returned to the caller.

use std::path::Path;

use dyad_types::config::SimulationConfig;
use dyad_types::error::ConfigError;

/// Load and validate a simulation configuration from `path`.
pub async fn load_simulation_config(path: &Path) -> Result<SimulationConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

    let config = parse_simulation_config(&content, path)?;
    tracing::debug!(
        path = %path.display(),
        providers = config.providers.len(),
        experts = config.experts.len(),
        "Loaded simulation config"
    );
    Ok(config)
}

/// Parse and validate configuration text; `origin` is only used in errors.
pub fn parse_simulation_config(content: &str, origin: &Path) -> Result<SimulationConfig, ConfigError> {
    let config = toml::from_str::<SimulationConfig>(content).map_err(|err| ConfigError::Parse {
        path: origin.display().to_string(),
        message: err.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
