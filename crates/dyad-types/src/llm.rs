//! LLM request/response types for dyad.
//!
//! These types model the data shapes for Model Gateway interactions:
//! chat messages, per-call sampling parameters, completion responses with
//! their raw payload, provider configuration and the gateway error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Immutable per-call sampling configuration.
///
/// Passed by reference into every gateway call; nothing in the gateway
/// mutates it, so concurrent callers can share one instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl SamplingParams {
    pub fn new(temperature: f64, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    /// Same parameters with a different temperature.
    pub fn with_temperature(self, temperature: f64) -> Self {
        Self {
            temperature,
            ..self
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Request to an LLM provider for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model override; empty means "use the provider's configured model".
    #[serde(default)]
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    /// Build a request from a message list and sampling parameters.
    pub fn from_messages(messages: &[Message], params: &SamplingParams) -> Self {
        Self {
            model: String::new(),
            messages: messages.to_vec(),
            max_tokens: params.max_tokens,
            temperature: Some(params.temperature),
        }
    }
}

/// Response from an LLM provider.
///
/// `content` is the generated text; `raw` is the provider's full payload.
/// The dialogue engine copies it onto each `DialogueTurn`, so session logs
/// carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub usage: Usage,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Token usage for a completion request/response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Errors from Model Gateway operations.
///
/// This is the only checked error type the engine and validator handle
/// from a backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("context length exceeded")]
    ContextLengthExceeded,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),
}

impl LlmError {
    /// Whether retrying or failing over to another provider may help.
    ///
    /// Auth and request-shape errors are not transient: another attempt
    /// with the same request will fail the same way.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Provider { .. }
                | LlmError::RateLimited { .. }
                | LlmError::Overloaded(..)
                | LlmError::Timeout(..)
        )
    }
}

/// Type of LLM provider backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::OpenAiCompatible => write!(f, "openai_compatible"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai_compatible" => Ok(ProviderType::OpenAiCompatible),
            other => Err(format!("invalid provider type: '{other}'")),
        }
    }
}

/// Configuration for a single named LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name referenced from roles and experts (e.g., "deepseek", "openrouter").
    pub name: String,
    /// Backend type for this provider.
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,
    /// Override the default base URL for the provider.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model identifier to use.
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Priority for fallback ordering; lower = higher priority.
    #[serde(default)]
    pub priority: u32,
}

fn default_provider_type() -> ProviderType {
    ProviderType::OpenAiCompatible
}
