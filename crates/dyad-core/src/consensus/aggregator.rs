//! Expert fan-out and fusion.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use dyad_types::emotion::{ConsensusRecord, EmotionUpdateSignal, ExpertJudgment, IntensityScale};
use dyad_types::llm::{Message, SamplingParams};

use super::parse::parse_judgment;
use crate::llm::fallback::FallbackChain;

/// One expert on the panel: its backend chain and sampling settings.
#[derive(Debug, Clone)]
pub struct ExpertPanelMember {
    pub id: String,
    pub chain: Arc<FallbackChain>,
    pub params: SamplingParams,
    pub scale: IntensityScale,
}

/// Stateless per call: owns the panel configuration, never session state.
#[derive(Debug, Clone, Default)]
pub struct ConsensusAggregator {
    experts: Vec<ExpertPanelMember>,
}

impl ConsensusAggregator {
    pub fn new(experts: Vec<ExpertPanelMember>) -> Self {
        Self { experts }
    }

    pub fn experts(&self) -> &[ExpertPanelMember] {
        &self.experts
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }

    /// Ask every expert in parallel and wait for all of them.
    ///
    /// `build_prompt` renders the evaluation request for an expert's
    /// intensity scale. The returned judgments follow panel order. A failed
    /// or panicked expert yields an "unknown" judgment and never blocks the
    /// others.
    pub async fn collect<F>(&self, turn_number: u32, build_prompt: F) -> Vec<ExpertJudgment>
    where
        F: Fn(IntensityScale) -> Vec<Message>,
    {
        let mut set = JoinSet::new();
        for (index, expert) in self.experts.iter().enumerate() {
            let messages = build_prompt(expert.scale);
            let expert = expert.clone();
            set.spawn(async move {
                let judgment = match expert.chain.send(&messages, &expert.params).await {
                    Ok(response) => {
                        parse_judgment(&response.content, expert.scale).into_judgment(&expert.id, turn_number)
                    }
                    Err(err) => {
                        warn!(expert_id = %expert.id, turn = turn_number, error = %err, "Expert call failed");
                        ExpertJudgment::unknown(&expert.id, turn_number, format!("gateway error: {err}"))
                    }
                };
                (index, judgment)
            });
        }

        let mut slots: Vec<Option<ExpertJudgment>> = vec![None; self.experts.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, judgment)) => slots[index] = Some(judgment),
                Err(err) => warn!(turn = turn_number, error = %err, "Expert task did not complete"),
            }
        }

        slots
            .into_iter()
            .zip(&self.experts)
            .map(|(slot, expert)| {
                slot.unwrap_or_else(|| ExpertJudgment::unknown(&expert.id, turn_number, "expert task aborted"))
            })
            .collect()
    }
}

/// Fuse judgments into one update signal and an agreement ratio.
///
/// The score is the mean of usable judgments; with none usable the signal
/// is `NoUpdate`. Agreement is `count(most common label) / usable` and is
/// 0.0 below two usable judgments.
pub fn aggregate(judgments: &[ExpertJudgment]) -> (EmotionUpdateSignal, f64) {
    let fused = Fused::from_judgments(judgments);
    let signal = match fused.mean_score {
        Some(mean_score) => EmotionUpdateSignal::Consensus {
            mean_score,
            labels: fused.labels.clone(),
            agreement_ratio: fused.agreement_ratio,
        },
        None => EmotionUpdateSignal::NoUpdate,
    };
    (signal, fused.agreement_ratio)
}

/// Per-turn record of the fused panel, kept on the session result.
pub fn summarize(turn_number: u32, judgments: &[ExpertJudgment]) -> ConsensusRecord {
    let fused = Fused::from_judgments(judgments);
    info!(
        turn = turn_number,
        experts = judgments.len(),
        usable = fused.usable,
        mean = ?fused.mean_score,
        agreement = fused.agreement_ratio,
        "Expert consensus"
    );
    ConsensusRecord {
        turn_number,
        expert_count: judgments.len(),
        usable_count: fused.usable,
        mean_score: fused.mean_score,
        dominant_label: fused.dominant_label,
        labels: fused.labels,
        agreement_ratio: fused.agreement_ratio,
    }
}

struct Fused {
    usable: usize,
    mean_score: Option<f64>,
    labels: Vec<String>,
    dominant_label: Option<String>,
    agreement_ratio: f64,
}

impl Fused {
    fn from_judgments(judgments: &[ExpertJudgment]) -> Self {
        let usable: Vec<&ExpertJudgment> = judgments.iter().filter(|j| j.is_usable()).collect();
        let labels: Vec<String> = usable.iter().map(|j| j.primary_emotion.clone()).collect();

        let mean_score = (!usable.is_empty()).then(|| {
            usable.iter().map(|j| f64::from(j.emotion_score)).sum::<f64>() / usable.len() as f64
        });

        // Most common label; ties go to the label seen first.
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for label in &labels {
            *counts.entry(label.as_str()).or_default() += 1;
        }
        let mut dominant: Option<(&str, usize)> = None;
        for label in &labels {
            let count = counts[label.as_str()];
            if dominant.is_none_or(|(_, best)| count > best) {
                dominant = Some((label.as_str(), count));
            }
        }

        let agreement_ratio = match dominant {
            Some((_, count)) if usable.len() >= 2 => count as f64 / usable.len() as f64,
            _ => 0.0,
        };
        debug!(usable = usable.len(), agreement_ratio, "Fused expert judgments");

        Self {
            usable: usable.len(),
            mean_score,
            dominant_label: dominant.map(|(l, _)| l.to_string()),
            labels,
            agreement_ratio,
        }
    }
}
