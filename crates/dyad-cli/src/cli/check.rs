//! `dyad check-config`: validate a configuration and show how it resolves.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use dyad_infra::config::load_simulation_config;
use dyad_infra::llm::{api_key_env, checker_provider_names};
use dyad_types::config::SimulationConfig;

/// Load, validate and print the resolved configuration.
///
/// Fails when the file does not validate or a role cannot be served.
/// Missing API keys are reported but not fatal here.
pub async fn check_config(path: &Path, json: bool) -> Result<()> {
    let config = load_simulation_config(path)
        .await
        .with_context(|| format!("Invalid config {}", path.display()))?;
    config.validate_for_run().context("Config cannot run sessions")?;

    let keys: Vec<(String, String, bool)> = config
        .providers
        .iter()
        .map(|p| {
            let var = api_key_env(p);
            let present = std::env::var(&var).is_ok_and(|v| !v.trim().is_empty());
            (p.name.clone(), var, present)
        })
        .collect();

    if json {
        let api_keys: Vec<_> = keys
            .iter()
            .map(|(name, var, present)| serde_json::json!({ "provider": name, "env": var, "present": present }))
            .collect();
        let output = serde_json::json!({
            "path": path.display().to_string(),
            "config": config,
            "checker": checker_provider_names(&config),
            "api_keys": api_keys,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} is valid",
        style("ok").green().bold(),
        style(path.display()).cyan()
    );
    println!();
    print_settings(&config);
    print_providers(&config, &keys);
    Ok(())
}

fn print_settings(config: &SimulationConfig) {
    let (seed_low, seed_high) = config.emotion.seed_band();
    println!(
        "  Turns: {}   Consensus: {}   Prediction: {}",
        config.engine.max_turns, config.engine.consensus_enabled, config.engine.prediction_enabled
    );
    println!(
        "  Thresholds: critical {} / improvement {}   Seed band: [{seed_low}, {seed_high}]",
        config.emotion.critical_threshold, config.emotion.improvement_threshold
    );
    println!(
        "  Max change per turn: {}   Sustained decline: {} over {} turns",
        config.emotion.max_change_per_turn,
        config.emotion.sustained_decline_threshold,
        config.emotion.min_decline_run
    );
    println!();
    println!("  Persona: {}", config.roles.persona.join(" -> "));
    println!("  Partner: {}", config.roles.partner.join(" -> "));
    println!("  Checker: {}", checker_provider_names(config).join(" -> "));
    for (index, expert) in config.experts.iter().enumerate() {
        println!(
            "  Expert {}: {} (temperature {:.2}, scale {})",
            expert.id,
            expert.providers.join(" -> "),
            config.expert_temperature(index),
            expert.intensity_scale
        );
    }
    println!();
}

fn print_providers(config: &SimulationConfig, keys: &[(String, String, bool)]) {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Endpoint").fg(Color::White),
        Cell::new("API key").fg(Color::White),
    ]);

    for (provider, (_, var, present)) in config.providers.iter().zip(keys) {
        let key = if *present {
            Cell::new(format!("{var} set")).fg(Color::Green)
        } else {
            Cell::new(format!("{var} missing")).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&provider.name).fg(Color::Cyan),
            Cell::new(&provider.model),
            Cell::new(provider.base_url.as_deref().unwrap_or("(default)")).fg(Color::DarkGrey),
            key,
        ]);
    }

    println!("{table}");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[engine]
consensus_enabled = false

[[providers]]
name = "deepseek"
model = "deepseek-chat"
api_key_env = "DYAD_CHECK_TEST_UNSET_KEY"

[roles]
persona = ["deepseek"]
partner = ["deepseek"]
"#;

    #[tokio::test]
    async fn valid_config_passes_without_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dyad.toml");
        tokio::fs::write(&path, CONFIG).await.unwrap();
        check_config(&path, true).await.unwrap();
    }

    #[tokio::test]
    async fn config_without_providers_cannot_run() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dyad.toml");
        tokio::fs::write(&path, "").await.unwrap();
        assert!(check_config(&path, true).await.is_err());
    }
}
