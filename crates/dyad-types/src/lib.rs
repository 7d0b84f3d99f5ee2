//! Shared domain types for dyad.
//!
//! This crate contains the records exchanged across the dialogue simulator:
//! characters, scenarios, turns, emotion snapshots, expert judgments,
//! gateway request/response shapes, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod character;
pub mod config;
pub mod dialogue;
pub mod emotion;
pub mod error;
pub mod llm;
