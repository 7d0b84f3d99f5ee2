//! LLM provider implementations and gateway wiring.
//!
//! Contains the concrete [`LlmProvider`](dyad_core::llm::provider::LlmProvider)
//! implementation for OpenAI-compatible APIs, a provider factory
//! ([`create_provider`]) and the builders that turn a [`SimulationConfig`]
//! into per-role fallback chains and an expert panel.

pub mod openai_compat;

use std::sync::Arc;

use secrecy::SecretString;
use tracing::debug;

use dyad_core::consensus::{ConsensusAggregator, ExpertPanelMember};
use dyad_core::dialogue::SessionBackends;
use dyad_core::llm::box_provider::BoxLlmProvider;
use dyad_core::llm::fallback::{FallbackChain, RetryPolicy};
use dyad_types::config::SimulationConfig;
use dyad_types::error::ConfigError;
use dyad_types::llm::{ProviderConfig, ProviderType, SamplingParams};

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// An explicit `base_url` wins; otherwise well-known provider names map to
/// their public endpoints and unknown names default to OpenAI.
pub fn create_provider(config: &ProviderConfig, api_key: SecretString) -> BoxLlmProvider {
    match config.provider_type {
        ProviderType::OpenAiCompatible => {
            let provider = match config.base_url.as_deref() {
                Some(base_url) => OpenAiCompatibleProvider::new(OpenAiCompatConfig {
                    provider_name: config.name.clone(),
                    base_url: base_url.to_string(),
                    api_key,
                    model: config.model.clone(),
                }),
                None => match config.name.as_str() {
                    "deepseek" => OpenAiCompatibleProvider::deepseek(api_key, &config.model),
                    "openrouter" => OpenAiCompatibleProvider::openrouter(api_key, &config.model),
                    _ => OpenAiCompatibleProvider::openai(api_key, &config.model),
                },
            };
            BoxLlmProvider::new(provider)
        }
    }
}

/// Environment variable holding a provider's API key.
///
/// Defaults to `{NAME}_API_KEY` with the name upper-cased and dashes
/// replaced by underscores.
pub fn api_key_env(config: &ProviderConfig) -> String {
    config
        .api_key_env
        .clone()
        .unwrap_or_else(|| format!("{}_API_KEY", config.name.to_uppercase().replace('-', "_")))
}

/// Read a provider's API key from the environment.
pub fn resolve_api_key(config: &ProviderConfig) -> Result<SecretString, ConfigError> {
    let var = api_key_env(config);
    match std::env::var(&var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value)),
        _ => Err(ConfigError::MissingApiKey(var)),
    }
}

/// Resolves provider names to boxed providers.
///
/// The default resolver reads API keys from the environment; tests inject
/// their own.
pub trait ProviderResolver {
    fn resolve(&self, config: &ProviderConfig) -> Result<BoxLlmProvider, ConfigError>;
}

/// Builds OpenAI-compatible providers with keys from the environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvProviderResolver;

impl ProviderResolver for EnvProviderResolver {
    fn resolve(&self, config: &ProviderConfig) -> Result<BoxLlmProvider, ConfigError> {
        let key = resolve_api_key(config)?;
        Ok(create_provider(config, key))
    }
}

/// Build a fallback chain over `names`, tried in list order.
pub fn build_chain<R: ProviderResolver>(
    names: &[String],
    config: &SimulationConfig,
    resolver: &R,
    referenced_by: &str,
) -> Result<FallbackChain, ConfigError> {
    if names.is_empty() {
        return Err(ConfigError::EmptyRole(referenced_by.to_string()));
    }
    let mut providers = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let provider_config = config.provider(name).ok_or_else(|| ConfigError::UnknownProvider {
            name: name.clone(),
            referenced_by: referenced_by.to_string(),
        })?;
        providers.push((index as u32, resolver.resolve(provider_config)?));
    }
    debug!(role = referenced_by, providers = ?names, "Built fallback chain");
    Ok(FallbackChain::new(providers, RetryPolicy::from(&config.gateway)))
}

/// Provider names for the deep-check role.
///
/// Uses `roles.checker` when set, otherwise every configured provider in
/// `priority` order.
pub fn checker_provider_names(config: &SimulationConfig) -> Vec<String> {
    if !config.roles.checker.is_empty() {
        return config.roles.checker.clone();
    }
    let mut providers: Vec<&ProviderConfig> = config.providers.iter().collect();
    providers.sort_by_key(|p| p.priority);
    providers.into_iter().map(|p| p.name.clone()).collect()
}

/// Build every backend a session needs from the configuration.
pub fn build_backends<R: ProviderResolver>(
    config: &SimulationConfig,
    resolver: &R,
) -> Result<SessionBackends, ConfigError> {
    config.validate_for_run()?;

    let persona = build_chain(&config.roles.persona, config, resolver, "persona")?;
    let partner = build_chain(&config.roles.partner, config, resolver, "partner")?;
    let checker = build_chain(&checker_provider_names(config), config, resolver, "checker")?;

    let mut experts = Vec::new();
    if config.engine.consensus_enabled {
        for (index, expert) in config.experts.iter().enumerate() {
            let chain = build_chain(&expert.providers, config, resolver, &format!("expert '{}'", expert.id))?;
            experts.push(ExpertPanelMember {
                id: expert.id.clone(),
                chain: Arc::new(chain),
                params: SamplingParams::new(config.expert_temperature(index), config.engine.max_tokens),
                scale: expert.intensity_scale,
            });
        }
    }

    Ok(SessionBackends {
        persona: Arc::new(persona),
        partner: Arc::new(partner),
        checker: Arc::new(checker),
        experts: ConsensusAggregator::new(experts),
    })
}
