//! Multi-Expert Consensus Aggregator.
//!
//! Fans a turn's transcript out to every configured expert in parallel,
//! parses each reply into an `ExpertJudgment`, and fuses the judgments into
//! one update signal with an agreement ratio.

pub mod aggregator;
pub mod parse;

pub use aggregator::{ConsensusAggregator, ExpertPanelMember, aggregate, summarize};
