//! Multi-provider fallback chain.
//!
//! Routes LLM requests through multiple providers with automatic failover.
//! Providers are tried in priority order. Transient errors (provider down,
//! rate limited, overloaded, timed out) are retried with linear backoff and
//! then fail over; auth/request errors are returned immediately.
//!
//! The chain holds no mutable state, so one instance can be shared through
//! an `Arc` by every task of a session (and by concurrent expert calls).

use std::time::{Duration, Instant};

use tracing::{Instrument, debug, info_span, warn};

use dyad_observe::genai_attrs::{
    GEN_AI_RESPONSE_ID, GEN_AI_USAGE_INPUT_TOKENS, GEN_AI_USAGE_OUTPUT_TOKENS, OP_CHAT,
};
use dyad_types::config::GatewayConfig;
use dyad_types::llm::{CompletionRequest, CompletionResponse, LlmError, Message, SamplingParams};

use super::box_provider::BoxLlmProvider;

/// Retry and timeout policy applied to every provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts per provider after the first, on transient errors.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
    /// Upper bound for a single provider call.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for RetryPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Result of a successful completion through the fallback chain.
#[derive(Debug)]
pub struct FallbackResult {
    pub response: CompletionResponse,
    /// Name of the provider that handled the request.
    pub provider_name: String,
    /// Total attempts made across all providers.
    pub attempts: u32,
    /// Set when a non-primary provider answered.
    pub failover_warning: Option<String>,
}

struct ChainEntry {
    priority: u32,
    provider: BoxLlmProvider,
}

/// Routes LLM requests through multiple providers with automatic failover.
pub struct FallbackChain {
    providers: Vec<ChainEntry>,
    policy: RetryPolicy,
}

impl FallbackChain {
    /// Build a chain from `(priority, provider)` pairs.
    ///
    /// Lower priority values are tried first; ties keep the given order.
    pub fn new(providers: Vec<(u32, BoxLlmProvider)>, policy: RetryPolicy) -> Self {
        let mut providers: Vec<ChainEntry> = providers
            .into_iter()
            .map(|(priority, provider)| ChainEntry { priority, provider })
            .collect();
        providers.sort_by_key(|e| e.priority);
        Self { providers, policy }
    }

    /// Build a chain whose fallback order is the order of `providers`.
    pub fn ordered(providers: Vec<BoxLlmProvider>, policy: RetryPolicy) -> Self {
        let providers = providers
            .into_iter()
            .enumerate()
            .map(|(i, p)| (i as u32, p))
            .collect();
        Self::new(providers, policy)
    }

    /// Single-provider chain.
    pub fn single(provider: BoxLlmProvider, policy: RetryPolicy) -> Self {
        Self::new(vec![(0, provider)], policy)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Name of the provider tried first.
    pub fn primary_name(&self) -> Option<&str> {
        self.providers.first().map(|e| e.provider.name())
    }

    /// Provider names in the order they are tried.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|e| e.provider.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Send a conversation and return the generated text with its raw payload.
    pub async fn send(
        &self,
        messages: &[Message],
        params: &SamplingParams,
    ) -> Result<CompletionResponse, LlmError> {
        let request = CompletionRequest::from_messages(messages, params);
        self.complete(&request).await.map(|r| r.response)
    }

    /// Send a completion request through the fallback chain.
    ///
    /// Each provider gets up to `max_retries + 1` attempts on transient
    /// errors, each bounded by the policy timeout. A non-transient error
    /// stops the chain. When every provider is exhausted, the last error
    /// is returned.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<FallbackResult, LlmError> {
        let mut last_error: Option<LlmError> = None;
        let mut attempts = 0u32;

        for (position, entry) in self.providers.iter().enumerate() {
            let provider = &entry.provider;
            let provider_name = provider.name().to_string();

            for attempt in 0..=self.policy.max_retries {
                if attempt > 0 {
                    let delay = self.policy.backoff * attempt;
                    debug!(provider = %provider_name, attempt, ?delay, "Retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
                attempts += 1;

                let span = info_span!(
                    "gen_ai.complete",
                    gen_ai.operation.name = OP_CHAT,
                    gen_ai.provider.name = %provider_name,
                    gen_ai.request.model = %provider.model(),
                    gen_ai.request.max_tokens = request.max_tokens,
                    gen_ai.request.temperature = ?request.temperature,
                    gen_ai.usage.input_tokens = tracing::field::Empty,
                    gen_ai.usage.output_tokens = tracing::field::Empty,
                    gen_ai.response.id = tracing::field::Empty,
                );

                let start = Instant::now();
                let outcome = tokio::time::timeout(self.policy.timeout, provider.complete(request))
                    .instrument(span.clone())
                    .await
                    .unwrap_or_else(|_| Err(LlmError::Timeout(self.policy.timeout.as_millis() as u64)));
                let latency_ms = start.elapsed().as_millis() as u64;

                match outcome {
                    Ok(response) => {
                        span.record(GEN_AI_USAGE_INPUT_TOKENS, response.usage.input_tokens);
                        span.record(GEN_AI_USAGE_OUTPUT_TOKENS, response.usage.output_tokens);
                        span.record(GEN_AI_RESPONSE_ID, response.id.as_str());
                        debug!(provider = %provider_name, latency_ms, "Completion succeeded");

                        let failover_warning = (position > 0).then(|| {
                            format!(
                                "Switched to {provider_name} after {} failed",
                                self.providers[..position]
                                    .iter()
                                    .map(|e| e.provider.name())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            )
                        });
                        if let Some(ref warning) = failover_warning {
                            warn!(%warning, "Failover occurred");
                        }

                        return Ok(FallbackResult {
                            response,
                            provider_name,
                            attempts,
                            failover_warning,
                        });
                    }
                    Err(err) if !err.is_transient() => {
                        warn!(
                            provider = %provider_name,
                            error = %err,
                            "Non-transient error, returning immediately"
                        );
                        return Err(err);
                    }
                    Err(err) => {
                        warn!(
                            provider = %provider_name,
                            attempt,
                            latency_ms,
                            error = %err,
                            "Provider call failed"
                        );
                        last_error = Some(err);
                    }
                }
            }

            if position + 1 < self.providers.len() {
                warn!(provider = %provider_name, "Retries exhausted, trying next in chain");
            }
        }

        Err(last_error.unwrap_or(LlmError::Provider {
            message: "fallback chain has no providers".to_string(),
        }))
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("providers", &self.provider_names())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_happy_path_primary_succeeds() {
        let primary = MockProvider::fixed("primary", "Hello from primary");
        let secondary = MockProvider::fixed("secondary", "Hello from secondary");
        let secondary_calls = secondary.calls();
        let chain = FallbackChain::new(
            vec![(0, primary.boxed()), (1, secondary.boxed())],
            fast_policy(0),
        );

        let result = chain
            .complete(&CompletionRequest::from_messages(&[], &SamplingParams::default()))
            .await
            .unwrap();

        assert_eq!(result.provider_name, "primary");
        assert_eq!(result.response.content, "Hello from primary");
        assert!(result.failover_warning.is_none());
        assert_eq!(secondary_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_priority_orders_providers() {
        let chain = FallbackChain::new(
            vec![
                (5, MockProvider::fixed("late", "late").boxed()),
                (1, MockProvider::fixed("early", "early").boxed()),
            ],
            fast_policy(0),
        );
        assert_eq!(chain.provider_names(), vec!["early", "late"]);
        assert_eq!(chain.primary_name(), Some("early"));
    }

    #[tokio::test]
    async fn test_failover_after_retries_exhausted() {
        let primary = MockProvider::failing("primary", || LlmError::Provider {
            message: "500".into(),
        });
        let primary_calls = primary.calls();
        let chain = FallbackChain::ordered(
            vec![primary.boxed(), MockProvider::fixed("secondary", "ok").boxed()],
            fast_policy(2),
        );

        let response = chain
            .complete(&CompletionRequest::from_messages(&[], &SamplingParams::default()))
            .await
            .unwrap();

        assert_eq!(response.provider_name, "secondary");
        assert_eq!(response.attempts, 4);
        assert_eq!(primary_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(response.failover_warning.unwrap().contains("Switched to secondary"));
    }

    #[tokio::test]
    async fn test_auth_error_does_not_fail_over() {
        let secondary = MockProvider::fixed("secondary", "ok");
        let secondary_calls = secondary.calls();
        let chain = FallbackChain::ordered(
            vec![
                MockProvider::failing("primary", || LlmError::AuthenticationFailed).boxed(),
                secondary.boxed(),
            ],
            fast_policy(2),
        );

        let err = chain
            .send(&[Message::user("hi")], &SamplingParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::AuthenticationFailed));
        assert_eq!(secondary_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_and_retried() {
        let slow = MockProvider::fixed("slow", "too late").with_delay(Duration::from_secs(5));
        let slow_calls = slow.calls();
        let chain = FallbackChain::single(slow.boxed(), fast_policy(1));

        let err = chain
            .send(&[Message::user("hi")], &SamplingParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Timeout(200)));
        assert_eq!(slow_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_exhausted_returns_last_error() {
        let chain = FallbackChain::ordered(
            vec![
                MockProvider::failing("a", || LlmError::Overloaded("a busy".into())).boxed(),
                MockProvider::failing("b", || LlmError::RateLimited { retry_after_ms: None }).boxed(),
            ],
            fast_policy(0),
        );

        let err = chain
            .send(&[Message::user("hi")], &SamplingParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_empty_chain_errors() {
        let chain = FallbackChain::ordered(vec![], fast_policy(0));
        assert!(chain.is_empty());
        let err = chain
            .send(&[Message::user("hi")], &SamplingParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_send_passes_sampling_params() {
        let provider = MockProvider::echo_temperature("p");
        let chain = Arc::new(FallbackChain::single(provider.boxed(), fast_policy(0)));
        let params = SamplingParams::new(0.35, 64);

        let response = chain.send(&[Message::user("hi")], &params).await.unwrap();
        assert_eq!(response.content, "temperature=0.35 max_tokens=64");
    }
}
