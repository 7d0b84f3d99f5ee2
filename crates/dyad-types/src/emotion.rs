//! Emotion records: snapshots of the mood trajectory, expert judgments,
//! fused update signals and next-turn predictions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest representable mood score.
pub const SCORE_MIN: i32 = -10;
/// Highest representable mood score.
pub const SCORE_MAX: i32 = 10;
/// Label carried by a judgment or prediction that could not be parsed.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Clamp a score into `[SCORE_MIN, SCORE_MAX]`.
pub fn clamp_score(score: i32) -> i32 {
    score.clamp(SCORE_MIN, SCORE_MAX)
}

/// One point of the session's mood trajectory.
///
/// Fields are private so the score can only enter through a constructor
/// that clamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    turn_number: u32,
    emotions: Vec<String>,
    score: i32,
    previous_score: i32,
    delta: i32,
}

impl EmotionSnapshot {
    /// Initial snapshot of a session (turn 0, zero delta).
    pub fn seed(score: i32, emotions: Vec<String>) -> Self {
        let score = clamp_score(score);
        Self {
            turn_number: 0,
            emotions,
            score,
            previous_score: score,
            delta: 0,
        }
    }

    /// Snapshot following `previous`. The score is range-clamped; limiting
    /// the per-turn change is the tracker's job.
    pub fn after(previous: &EmotionSnapshot, turn_number: u32, score: i32, emotions: Vec<String>) -> Self {
        let score = clamp_score(score);
        Self {
            turn_number,
            emotions,
            score,
            previous_score: previous.score,
            delta: score - previous.score,
        }
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn emotions(&self) -> &[String] {
        &self.emotions
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn previous_score(&self) -> i32 {
        self.previous_score
    }

    pub fn delta(&self) -> i32 {
        self.delta
    }
}

/// Scale an expert reports intensity on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityScale {
    /// 1 to 5.
    #[default]
    Likert5,
    /// 0 to 100.
    Percent,
}

impl IntensityScale {
    pub fn bounds(self) -> (u32, u32) {
        match self {
            IntensityScale::Likert5 => (1, 5),
            IntensityScale::Percent => (0, 100),
        }
    }

    pub fn clamp(self, value: u32) -> u32 {
        let (lo, hi) = self.bounds();
        value.clamp(lo, hi)
    }
}

impl fmt::Display for IntensityScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntensityScale::Likert5 => write!(f, "likert5"),
            IntensityScale::Percent => write!(f, "percent"),
        }
    }
}

/// One expert's assessment of the persona's emotion at a turn.
///
/// Transient: folded into a single snapshot and then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertJudgment {
    pub expert_id: String,
    pub turn_number: u32,
    pub primary_emotion: String,
    pub intensity: u32,
    pub emotion_score: i32,
    #[serde(default)]
    pub key_triggers: Vec<String>,
    #[serde(default)]
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExpertJudgment {
    /// Placeholder for an expert whose reply (or call) yielded nothing usable.
    pub fn unknown(expert_id: impl Into<String>, turn_number: u32, error: impl Into<String>) -> Self {
        Self {
            expert_id: expert_id.into(),
            turn_number,
            primary_emotion: UNKNOWN_LABEL.to_string(),
            intensity: 0,
            emotion_score: 0,
            key_triggers: Vec::new(),
            analysis: String::new(),
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.primary_emotion != UNKNOWN_LABEL
    }
}

/// The single mood update the engine hands the tracker each turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmotionUpdateSignal {
    /// Score self-reported by the persona model.
    Direct { score: i32, emotions: Vec<String> },
    /// Fused expert judgments.
    Consensus {
        mean_score: f64,
        labels: Vec<String>,
        agreement_ratio: f64,
    },
    /// Nothing usable this turn; the previous score carries forward.
    NoUpdate,
}

/// Per-turn summary of the expert panel, kept on the session result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub turn_number: u32,
    pub expert_count: usize,
    pub usable_count: usize,
    pub mean_score: Option<f64>,
    pub dominant_label: Option<String>,
    pub labels: Vec<String>,
    pub agreement_ratio: f64,
}

/// The partner model's guess at the persona's next emotional state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionPrediction {
    /// Turn the prediction was made after; it targets `turn_number + 1`.
    pub turn_number: u32,
    pub predicted_emotion: String,
    pub intensity: u32,
    pub emotion_score: Option<i32>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmotionPrediction {
    pub fn unknown(turn_number: u32, error: impl Into<String>) -> Self {
        Self {
            turn_number,
            predicted_emotion: UNKNOWN_LABEL.to_string(),
            intensity: 0,
            emotion_score: None,
            explanation: String::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_clamps_and_has_zero_delta() {
        let seed = EmotionSnapshot::seed(14, vec![]);
        assert_eq!(seed.score(), 10);
        assert_eq!(seed.previous_score(), 10);
        assert_eq!(seed.delta(), 0);
        assert_eq!(seed.turn_number(), 0);
    }

    #[test]
    fn test_after_clamps_range_and_computes_delta() {
        let seed = EmotionSnapshot::seed(-9, vec![]);
        let next = EmotionSnapshot::after(&seed, 1, -15, vec!["anger".into()]);
        assert_eq!(next.score(), -10);
        assert_eq!(next.previous_score(), -9);
        assert_eq!(next.delta(), -1);
        assert_eq!(next.emotions(), ["anger".to_string()]);
    }

    #[test]
    fn test_intensity_scale_clamp() {
        assert_eq!(IntensityScale::Likert5.clamp(9), 5);
        assert_eq!(IntensityScale::Likert5.clamp(0), 1);
        assert_eq!(IntensityScale::Percent.clamp(250), 100);
    }

    #[test]
    fn test_unknown_judgment_is_not_usable() {
        let j = ExpertJudgment::unknown("expert_1", 2, "timeout");
        assert!(!j.is_usable());
        assert_eq!(j.intensity, 0);
        assert_eq!(j.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_signal_serde_tag() {
        let json = serde_json::to_string(&EmotionUpdateSignal::NoUpdate).unwrap();
        assert_eq!(json, r#"{"kind":"no_update"}"#);
    }
}
