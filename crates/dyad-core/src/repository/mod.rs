//! Repository trait definitions (ports).
//!
//! These traits define the catalog and session-log interfaces that the
//! infrastructure layer (dyad-infra) implements. The core crate never
//! depends on a specific storage format.

pub mod catalog;
pub mod session_log;
