//! Dialogue Turn Engine and the persona-reply and prediction helpers it uses.

pub mod engine;
pub mod prediction;
pub mod reply;

pub use engine::{DialogueSession, SessionBackends, SessionState};
