//! LlmProvider trait definition.
//!
//! This is the core abstraction that all model backends implement.

use dyad_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends (DeepSeek, OpenRouter, etc.).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition) for
/// `complete`. Implementations live in dyad-infra
/// (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "deepseek", "openrouter").
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
