//! Configuration and per-provider defaults for OpenAI-compatible backends.
//!
//! Each well-known backend that speaks the chat completions protocol gets a
//! factory function returning an [`OpenAiCompatConfig`] with the correct
//! base URL.

use secrecy::SecretString;

/// Configuration for an OpenAI-compatible backend.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Provider name as referenced from roles (e.g., "deepseek").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.deepseek.com/v1").
    pub base_url: String,
    pub api_key: SecretString,
    /// Model identifier (e.g., "deepseek-chat").
    pub model: String,
}

/// DeepSeek default configuration.
///
/// Base URL: `https://api.deepseek.com/v1`
pub fn deepseek_defaults(api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "deepseek".into(),
        base_url: "https://api.deepseek.com/v1".into(),
        api_key,
        model: model.into(),
    }
}

/// OpenRouter default configuration.
///
/// Base URL: `https://openrouter.ai/api/v1`
pub fn openrouter_defaults(api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openrouter".into(),
        base_url: "https://openrouter.ai/api/v1".into(),
        api_key,
        model: model.into(),
    }
}

/// OpenAI default configuration.
///
/// Base URL: `https://api.openai.com/v1`
pub fn openai_defaults(api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key,
        model: model.into(),
    }
}
