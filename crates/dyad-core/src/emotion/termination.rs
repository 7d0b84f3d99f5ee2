//! Termination Policy.
//!
//! A pure function over the snapshot history and turn counter. Rules are
//! checked in a fixed priority order and the first match wins:
//!
//! 1. `turn_count >= max_turns` -> `MaxTurns`
//! 2. enough snapshots and score >= improvement threshold -> `Improvement`
//! 3. score <= critical threshold -> `Critical`
//! 4. enough snapshots and a trailing strictly-decreasing run that is long
//!    and deep enough -> `SustainedDecline`

use dyad_types::config::EmotionConfig;
use dyad_types::dialogue::EndReason;
use dyad_types::emotion::EmotionSnapshot;

/// Decide whether a session should stop after `turn_count` turns.
///
/// `history` includes the seed snapshot. Returns `None` for an empty history
/// unless the turn limit alone applies.
pub fn evaluate_termination(
    history: &[EmotionSnapshot],
    turn_count: u32,
    max_turns: u32,
    config: &EmotionConfig,
) -> Option<EndReason> {
    if turn_count >= max_turns {
        return Some(EndReason::MaxTurns);
    }

    let current = history.last()?.score();
    let enough_history = history.len() >= config.min_snapshots_for_trend;

    if enough_history && current >= config.improvement_threshold {
        return Some(EndReason::Improvement);
    }
    if current <= config.critical_threshold {
        return Some(EndReason::Critical);
    }
    if enough_history {
        let (run, drop) = trailing_decline(history);
        if run >= config.min_decline_run && drop >= config.sustained_decline_threshold {
            return Some(EndReason::SustainedDecline);
        }
    }
    None
}

/// Length and cumulative drop of the most recent strictly-decreasing run.
///
/// Length counts decreasing steps: scores 5, 3, 0, -2 give a run of 3 with a
/// drop of 7. Walking backward stops at the first step that is not a decrease.
pub fn trailing_decline(history: &[EmotionSnapshot]) -> (usize, i32) {
    let mut run = 0;
    let mut drop = 0;
    for pair in history.windows(2).rev() {
        let (before, after) = (pair[0].score(), pair[1].score());
        if after >= before {
            break;
        }
        run += 1;
        drop += before - after;
    }
    (run, drop)
}
