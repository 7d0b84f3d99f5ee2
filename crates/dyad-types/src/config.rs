//! Simulation configuration types.
//!
//! `SimulationConfig` represents the `dyad.toml` file. Every field has a
//! serde default, so an empty document deserializes to a usable (if
//! provider-less) configuration.

use serde::{Deserialize, Serialize};

use crate::emotion::{IntensityScale, SCORE_MAX, SCORE_MIN};
use crate::error::ConfigError;
use crate::llm::ProviderConfig;

/// Top-level configuration for a simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub emotion: EmotionConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub experts: Vec<ExpertConfig>,
}

/// Turn engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_true")]
    pub consensus_enabled: bool,
    #[serde(default)]
    pub prediction_enabled: bool,
    #[serde(default = "default_role_temperature")]
    pub persona_temperature: f64,
    #[serde(default = "default_role_temperature")]
    pub partner_temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Fixed seed for reproducible mood seeding; random when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_max_turns() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_role_temperature() -> f64 {
    0.8
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            consensus_enabled: true,
            prediction_enabled: false,
            persona_temperature: default_role_temperature(),
            partner_temperature: default_role_temperature(),
            max_tokens: default_max_tokens(),
            rng_seed: None,
        }
    }
}

/// Thresholds and seeding for the emotion tracker and termination policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionConfig {
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: i32,
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: i32,
    /// Distance kept above the critical threshold when seeding.
    #[serde(default = "default_seed_margin")]
    pub seed_margin: i32,
    /// Width of the uniform draw at the bottom of the safe band.
    #[serde(default = "default_seed_spread")]
    pub seed_spread: i32,
    #[serde(default = "default_trait_shift")]
    pub neuroticism_shift: i32,
    #[serde(default = "default_trait_shift")]
    pub openness_shift: i32,
    #[serde(default = "default_max_change_per_turn")]
    pub max_change_per_turn: i32,
    #[serde(default = "default_sustained_decline_threshold")]
    pub sustained_decline_threshold: i32,
    #[serde(default = "default_min_decline_run")]
    pub min_decline_run: usize,
    #[serde(default = "default_min_snapshots_for_trend")]
    pub min_snapshots_for_trend: usize,
}

fn default_critical_threshold() -> i32 {
    -10
}

fn default_improvement_threshold() -> i32 {
    7
}

fn default_seed_margin() -> i32 {
    2
}

fn default_seed_spread() -> i32 {
    2
}

fn default_trait_shift() -> i32 {
    1
}

fn default_max_change_per_turn() -> i32 {
    3
}

fn default_sustained_decline_threshold() -> i32 {
    6
}

fn default_min_decline_run() -> usize {
    3
}

fn default_min_snapshots_for_trend() -> usize {
    3
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            critical_threshold: default_critical_threshold(),
            improvement_threshold: default_improvement_threshold(),
            seed_margin: default_seed_margin(),
            seed_spread: default_seed_spread(),
            neuroticism_shift: default_trait_shift(),
            openness_shift: default_trait_shift(),
            max_change_per_turn: default_max_change_per_turn(),
            sustained_decline_threshold: default_sustained_decline_threshold(),
            min_decline_run: default_min_decline_run(),
            min_snapshots_for_trend: default_min_snapshots_for_trend(),
        }
    }
}

impl EmotionConfig {
    /// Inclusive seed band `[critical + margin, improvement - 1]`.
    pub fn seed_band(&self) -> (i32, i32) {
        (
            self.critical_threshold.saturating_add(self.seed_margin),
            self.improvement_threshold.saturating_sub(1),
        )
    }
}

/// Format rules and repair settings for the response validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_true")]
    pub forbid_latin: bool,
    /// Shortest run of Latin letters that counts as foreign text.
    #[serde(default = "default_latin_run_min")]
    pub latin_run_min: usize,
    #[serde(default = "default_monologue_markers")]
    pub monologue_markers: Vec<String>,
    #[serde(default = "default_disallowed_punctuation")]
    pub disallowed_punctuation: Vec<String>,
    #[serde(default = "default_repair_temperature")]
    pub repair_temperature: f64,
    /// Repair rounds before a reply is accepted with a warning. At most
    /// `MAX_REPAIR_ATTEMPTS`.
    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: u32,
}

fn default_latin_run_min() -> usize {
    3
}

fn default_monologue_markers() -> Vec<String> {
    vec!["【内心】".to_string(), "[inner]".to_string()]
}

fn default_disallowed_punctuation() -> Vec<String> {
    vec!["*".to_string(), "#".to_string(), "~".to_string()]
}

fn default_repair_temperature() -> f64 {
    0.3
}

/// Upper bound on `ValidatorConfig::max_repair_attempts`.
pub const MAX_REPAIR_ATTEMPTS: u32 = 2;

fn default_max_repair_attempts() -> u32 {
    MAX_REPAIR_ATTEMPTS
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            forbid_latin: true,
            latin_run_min: default_latin_run_min(),
            monologue_markers: default_monologue_markers(),
            disallowed_punctuation: default_disallowed_punctuation(),
            repair_temperature: default_repair_temperature(),
            max_repair_attempts: default_max_repair_attempts(),
        }
    }
}

/// Retry and timeout policy for every gateway call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts per provider on transient errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Batch runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_max_workers() -> usize {
    4
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            log_dir: default_log_dir(),
        }
    }
}

/// Provider names per dialogue role, in fallback order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub persona: Vec<String>,
    #[serde(default)]
    pub partner: Vec<String>,
    /// Backends for the validator's deep check. When empty, every
    /// configured provider is used in `priority` order.
    #[serde(default)]
    pub checker: Vec<String>,
}

/// One emotion expert on the consensus panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertConfig {
    pub id: String,
    /// Provider names in fallback order.
    pub providers: Vec<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub intensity_scale: IntensityScale,
}

/// Temperature for the expert at `index` when none is configured.
pub fn default_expert_temperature(index: usize) -> f64 {
    0.2 + 0.1 * index as f64
}

impl SimulationConfig {
    /// Look up a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Effective sampling temperature of the expert at `index`.
    pub fn expert_temperature(&self, index: usize) -> f64 {
        self.experts
            .get(index)
            .and_then(|e| e.temperature)
            .unwrap_or_else(|| default_expert_temperature(index))
    }

    /// Check thresholds, limits and provider references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let emotion = &self.emotion;
        for (name, value) in [
            ("critical_threshold", emotion.critical_threshold),
            ("improvement_threshold", emotion.improvement_threshold),
        ] {
            if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(ConfigError::InvalidThresholds(format!(
                    "{name} = {value} is outside [{SCORE_MIN}, {SCORE_MAX}]"
                )));
            }
        }
        if emotion.critical_threshold >= emotion.improvement_threshold {
            return Err(ConfigError::InvalidThresholds(format!(
                "critical_threshold ({}) must be below improvement_threshold ({})",
                emotion.critical_threshold, emotion.improvement_threshold
            )));
        }
        if emotion.seed_margin < 0 || emotion.seed_spread < 0 {
            return Err(ConfigError::InvalidValue {
                field: "seed_margin",
                message: "seed_margin and seed_spread must not be negative".into(),
            });
        }
        let (lo, hi) = emotion.seed_band();
        if lo > hi {
            return Err(ConfigError::InvalidThresholds(format!(
                "seed band [{lo}, {hi}] is empty; reduce seed_margin"
            )));
        }
        if emotion.max_change_per_turn < 1 {
            return Err(ConfigError::InvalidValue {
                field: "max_change_per_turn",
                message: "must be at least 1".into(),
            });
        }
        if emotion.min_decline_run < 1 {
            return Err(ConfigError::InvalidValue {
                field: "min_decline_run",
                message: "must be at least 1".into(),
            });
        }
        if self.validator.max_repair_attempts > MAX_REPAIR_ATTEMPTS {
            return Err(ConfigError::InvalidValue {
                field: "max_repair_attempts",
                message: format!("at most {MAX_REPAIR_ATTEMPTS} repair attempts are allowed"),
            });
        }
        if self.engine.max_turns < 1 {
            return Err(ConfigError::InvalidValue {
                field: "max_turns",
                message: "must be at least 1".into(),
            });
        }
        if self.batch.max_workers < 1 {
            return Err(ConfigError::InvalidValue {
                field: "max_workers",
                message: "must be at least 1".into(),
            });
        }

        self.check_provider_refs("roles.persona", &self.roles.persona)?;
        self.check_provider_refs("roles.partner", &self.roles.partner)?;
        self.check_provider_refs("roles.checker", &self.roles.checker)?;
        for expert in &self.experts {
            if expert.providers.is_empty() {
                return Err(ConfigError::EmptyRole(format!("expert '{}'", expert.id)));
            }
            self.check_provider_refs(&format!("expert '{}'", expert.id), &expert.providers)?;
        }
        Ok(())
    }

    /// Validation plus the requirement that both dialogue roles have a backend.
    pub fn validate_for_run(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.roles.persona.is_empty() {
            return Err(ConfigError::EmptyRole("persona".into()));
        }
        if self.roles.partner.is_empty() {
            return Err(ConfigError::EmptyRole("partner".into()));
        }
        if self.engine.consensus_enabled && self.experts.is_empty() {
            return Err(ConfigError::EmptyRole("experts".into()));
        }
        Ok(())
    }

    fn check_provider_refs(&self, referenced_by: &str, names: &[String]) -> Result<(), ConfigError> {
        for name in names {
            if self.provider(name).is_none() {
                return Err(ConfigError::UnknownProvider {
                    name: name.clone(),
                    referenced_by: referenced_by.to_string(),
                });
            }
        }
        Ok(())
    }
}
