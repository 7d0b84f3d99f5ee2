//! Infrastructure layer for dyad.
//!
//! Contains implementations of the ports defined in `dyad-core`: the
//! OpenAI-compatible LLM provider and gateway wiring, the TOML configuration
//! loader, the JSON scenario/character catalog, and the JSON session log.

pub mod catalog;
pub mod config;
pub mod llm;
pub mod session_log;
