//! Dialogue turn and session result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::character::{CharacterProfile, ScenarioSituation};
use crate::emotion::{ConsensusRecord, EmotionPrediction, EmotionSnapshot};

/// Current version of the session log document layout.
pub const SESSION_LOG_SCHEMA_VERSION: u32 = 1;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    MaxTurns,
    Improvement,
    Critical,
    SustainedDecline,
    BackendFailure,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::MaxTurns => "max_turns",
            EndReason::Improvement => "improvement",
            EndReason::Critical => "critical",
            EndReason::SustainedDecline => "sustained_decline",
            EndReason::BackendFailure => "backend_failure",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an utterance made it through the response validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Accepted without repair.
    #[default]
    Passed,
    /// Replaced by a repaired generation that passed the deep check.
    Repaired,
    /// Repair budget exhausted or interrupted; last text kept as-is.
    AcceptedWithWarning,
}

/// One completed turn. Append-only; never rewritten after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// 1-based, monotonic.
    pub turn_number: u32,
    /// Spoken persona text after monologue and self-report removal.
    pub persona_utterance: String,
    /// Persona reply exactly as the model produced it.
    pub persona_raw: String,
    /// Provider payload behind `persona_raw`. Null when the backend sent none.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub persona_payload: serde_json::Value,
    #[serde(default)]
    pub inner_monologue: String,
    pub persona_validation: ValidationStatus,
    /// `None` when the dialogue ended on this turn before the partner spoke.
    pub partner_utterance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_validation: Option<ValidationStatus>,
    /// Provider payload of the partner's first reply this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_payload: Option<serde_json::Value>,
    pub emotion_snapshot: EmotionSnapshot,
    pub ended: bool,
    pub end_reason: Option<EndReason>,
}

/// Finalized outcome of a session. Built exactly once, then immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub character: CharacterProfile,
    pub scenario: ScenarioSituation,
    pub turns: Vec<DialogueTurn>,
    /// Full trajectory, seed snapshot first.
    pub snapshots: Vec<EmotionSnapshot>,
    pub final_score: i32,
    pub turns_completed: u32,
    pub termination_reason: EndReason,
    #[serde(default)]
    pub consensus: Vec<ConsensusRecord>,
    #[serde(default)]
    pub predictions: Vec<EmotionPrediction>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionResult {
    /// Mean agreement ratio over turns with at least two usable judgments.
    pub fn mean_agreement(&self) -> Option<f64> {
        let ratios: Vec<f64> = self
            .consensus
            .iter()
            .filter(|c| c.usable_count >= 2)
            .map(|c| c.agreement_ratio)
            .collect();
        if ratios.is_empty() {
            return None;
        }
        Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
    }

    /// Mean of `1 - |predicted - actual| / 20` over predictions whose
    /// target turn has a snapshot.
    pub fn prediction_accuracy(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .predictions
            .iter()
            .filter_map(|p| {
                let predicted = p.emotion_score?;
                let actual = self
                    .snapshots
                    .iter()
                    .find(|s| s.turn_number() == p.turn_number + 1)?
                    .score();
                Some(1.0 - f64::from((predicted - actual).abs()) / 20.0)
            })
            .collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// System prompts a session was run with, kept for replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPrompts {
    pub persona_system: String,
    pub partner_system: String,
}

/// Self-describing document written once per finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLogRecord {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub result: SessionResult,
    pub prompts: SessionPrompts,
}

impl SessionLogRecord {
    pub fn new(result: SessionResult, prompts: SessionPrompts) -> Self {
        Self {
            schema_version: SESSION_LOG_SCHEMA_VERSION,
            created_at: Utc::now(),
            result,
            prompts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(snapshots: Vec<EmotionSnapshot>) -> SessionResult {
        let character: CharacterProfile =
            serde_json::from_str(r#"{"id":"c1","name":"Lin"}"#).unwrap();
        let scenario = ScenarioSituation {
            scenario_id: "s".into(),
            situation_id: "t".into(),
            name: "late replies".into(),
            description: String::new(),
            example: String::new(),
            typical_triggers: vec![],
        };
        let final_score = snapshots.last().map(|s| s.score()).unwrap_or(0);
        SessionResult {
            character,
            scenario,
            turns: vec![],
            snapshots,
            final_score,
            turns_completed: 0,
            termination_reason: EndReason::MaxTurns,
            consensus: vec![],
            predictions: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_end_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&EndReason::SustainedDecline).unwrap(),
            "\"sustained_decline\""
        );
        assert_eq!(EndReason::BackendFailure.to_string(), "backend_failure");
    }

    #[test]
    fn test_prediction_accuracy_compares_next_turn() {
        let seed = EmotionSnapshot::seed(0, vec![]);
        let t1 = EmotionSnapshot::after(&seed, 1, 2, vec![]);
        let t2 = EmotionSnapshot::after(&t1, 2, 4, vec![]);
        let mut result = result_with(vec![seed, t1, t2]);
        result.predictions = vec![
            EmotionPrediction {
                turn_number: 1,
                predicted_emotion: "joy".into(),
                intensity: 3,
                emotion_score: Some(0),
                explanation: String::new(),
                error: None,
            },
            // Targets turn 3, which never happened.
            EmotionPrediction {
                turn_number: 2,
                predicted_emotion: "joy".into(),
                intensity: 3,
                emotion_score: Some(4),
                explanation: String::new(),
                error: None,
            },
        ];
        let accuracy = result.prediction_accuracy().unwrap();
        assert!((accuracy - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_mean_agreement_skips_thin_panels() {
        let mut result = result_with(vec![EmotionSnapshot::seed(0, vec![])]);
        assert!(result.mean_agreement().is_none());
        result.consensus = vec![
            ConsensusRecord {
                turn_number: 1,
                expert_count: 3,
                usable_count: 3,
                mean_score: Some(6.0),
                dominant_label: Some("joy".into()),
                labels: vec!["joy".into(), "joy".into(), "trust".into()],
                agreement_ratio: 2.0 / 3.0,
            },
            ConsensusRecord {
                turn_number: 2,
                expert_count: 3,
                usable_count: 1,
                mean_score: Some(2.0),
                dominant_label: Some("fear".into()),
                labels: vec!["fear".into()],
                agreement_ratio: 0.0,
            },
        ];
        let mean = result.mean_agreement().unwrap();
        assert!((mean - 2.0 / 3.0).abs() < 1e-9);
    }
}
