//! Emotion State Tracker.
//!
//! Owns the single authoritative mood score of a session. Updates go
//! through a two-stage clamp: the change is limited to
//! `max_change_per_turn` first, then the result is clamped to the score
//! range. Swinging from -2 toward +9 with a limit of 3 lands on +1.

use rand::Rng;
use tracing::debug;

use dyad_types::character::CharacterProfile;
use dyad_types::config::EmotionConfig;
use dyad_types::dialogue::EndReason;
use dyad_types::emotion::{EmotionSnapshot, EmotionUpdateSignal};

use super::termination::evaluate_termination;

/// Personality marker that nudges the seed down.
pub const NEUROTICISM_MARKER: &str = "neuroticism_high";
/// Personality marker that nudges the seed up.
pub const OPENNESS_MARKER: &str = "openness_high";

/// Compute an initial score inside the safe band.
///
/// The band is `[critical + margin, improvement - 1]`. The draw is uniform
/// over the bottom `seed_spread` points of the band; personality markers
/// then shift it without leaving the band, so a session cannot terminate
/// on turn 1 from its seed alone.
pub fn seed_score<R: Rng>(character: &CharacterProfile, config: &EmotionConfig, rng: &mut R) -> i32 {
    let (lo, hi) = config.seed_band();
    let draw_hi = lo.saturating_add(config.seed_spread).min(hi).max(lo);
    let mut score = rng.gen_range(lo..=draw_hi);

    if character.has_trait(NEUROTICISM_MARKER) {
        score = (score - config.neuroticism_shift).max(lo);
    }
    if character.has_trait(OPENNESS_MARKER) {
        score = (score + config.openness_shift).min(hi);
    }
    score
}

/// Authoritative mood state for one session.
#[derive(Debug, Clone)]
pub struct EmotionTracker {
    config: EmotionConfig,
    snapshots: Vec<EmotionSnapshot>,
}

impl EmotionTracker {
    /// Seed a tracker for `character`.
    pub fn seed<R: Rng>(character: &CharacterProfile, config: EmotionConfig, rng: &mut R) -> Self {
        let score = seed_score(character, &config, rng);
        debug!(character = %character.id, score, "Seeded emotion score");
        Self::with_initial_score(score, config)
    }

    /// Tracker starting from a known score.
    pub fn with_initial_score(score: i32, config: EmotionConfig) -> Self {
        Self {
            config,
            snapshots: vec![EmotionSnapshot::seed(score, Vec::new())],
        }
    }

    pub fn config(&self) -> &EmotionConfig {
        &self.config
    }

    pub fn current_score(&self) -> i32 {
        self.snapshots.last().map(EmotionSnapshot::score).unwrap_or_default()
    }

    /// Full trajectory, seed first.
    pub fn snapshots(&self) -> &[EmotionSnapshot] {
        &self.snapshots
    }

    /// Apply one turn's signal and append the resulting snapshot.
    ///
    /// `NoUpdate` carries the previous score forward with a zero delta.
    pub fn update(&mut self, turn_number: u32, signal: &EmotionUpdateSignal) -> &EmotionSnapshot {
        let previous = self.current_score();
        let (candidate, emotions) = match signal {
            EmotionUpdateSignal::Direct { score, emotions } => (*score, emotions.clone()),
            EmotionUpdateSignal::Consensus {
                mean_score, labels, ..
            } => (mean_score.round() as i32, labels.clone()),
            EmotionUpdateSignal::NoUpdate => (previous, Vec::new()),
        };

        let score = self.clamp_candidate(previous, candidate);
        debug!(turn = turn_number, previous, candidate, score, "Emotion update");

        let snapshot = match self.snapshots.last() {
            Some(last) => EmotionSnapshot::after(last, turn_number, score, emotions),
            None => EmotionSnapshot::seed(score, emotions),
        };
        self.snapshots.push(snapshot);
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Limit the change first, then the range.
    pub fn clamp_candidate(&self, previous: i32, candidate: i32) -> i32 {
        let max_change = self.config.max_change_per_turn;
        let delta = (candidate - previous).clamp(-max_change, max_change);
        dyad_types::emotion::clamp_score(previous + delta)
    }

    /// Evaluate the termination policy over the current trajectory.
    pub fn evaluate_termination(&self, turn_count: u32, max_turns: u32) -> Option<EndReason> {
        evaluate_termination(&self.snapshots, turn_count, max_turns, &self.config)
    }

    pub fn into_snapshots(self) -> Vec<EmotionSnapshot> {
        self.snapshots
    }
}
