//! Session logic and repository trait definitions for dyad.
//!
//! This crate defines the "ports" (repository traits and the LLM provider
//! trait) that the infrastructure layer implements. It depends only on
//! `dyad-types` and the span attribute names in `dyad-observe` -- never on
//! `dyad-infra` or any network/IO crate.

pub mod consensus;
pub mod dialogue;
pub mod emotion;
pub mod extract;
pub mod llm;
pub mod prompt;
pub mod repository;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;
