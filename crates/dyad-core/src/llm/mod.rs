//! Model Gateway abstractions for dyad.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `FallbackChain`: priority-ordered failover with retries and timeouts

pub mod box_provider;
pub mod fallback;
pub mod provider;
