//! Response Validator.
//!
//! Two tiers: a local heuristic flags candidates, and a checker model gives
//! the binding compliant / non-compliant verdict. Only a failed deep check
//! triggers repair, which re-prompts the originating model at most
//! `max_repair_attempts` times and never raises: the last text is accepted
//! with a quality warning when repair runs out.

pub mod heuristic;

use std::sync::Arc;

use tracing::{debug, info, warn};

use dyad_types::config::ValidatorConfig;
use dyad_types::dialogue::ValidationStatus;
use dyad_types::llm::{LlmError, Message, SamplingParams};

use crate::llm::fallback::FallbackChain;
use crate::prompt;

use heuristic::FormatHeuristic;

/// Max tokens for the checker's one-word verdict.
const CHECKER_MAX_TOKENS: u32 = 16;

/// The model and conversation that produced an utterance, used to re-prompt it.
pub struct RepairContext<'a> {
    pub generator: &'a FallbackChain,
    /// Messages the rejected utterance was generated from.
    pub messages: &'a [Message],
    pub params: SamplingParams,
    /// Applied to every regenerated reply before it is checked again.
    pub postprocess: &'a (dyn Fn(&str) -> String + Send + Sync),
}

/// Result of running an utterance through the repair loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub text: String,
    /// Regenerations performed (0 when the input was accepted as-is).
    pub attempts: u32,
    pub status: ValidationStatus,
}

/// Verdict parsed from the checker reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Compliant,
    NonCompliant,
}

impl Verdict {
    /// Parse a checker reply. Anything other than an explicit "COMPLIANT"
    /// counts as non-compliant, since the heuristic already flagged the text.
    pub fn parse(reply: &str) -> Self {
        let upper = reply.trim().to_uppercase();
        if upper.contains("NON_COMPLIANT") || upper.contains("NON-COMPLIANT") || upper.contains("NONCOMPLIANT") {
            Verdict::NonCompliant
        } else if upper.contains("COMPLIANT") {
            Verdict::Compliant
        } else {
            Verdict::NonCompliant
        }
    }
}

/// Format validation and bounded repair for generated utterances.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    config: ValidatorConfig,
    heuristic: FormatHeuristic,
    checker: Arc<FallbackChain>,
}

impl ResponseValidator {
    pub fn new(config: ValidatorConfig, checker: Arc<FallbackChain>) -> Self {
        Self {
            heuristic: FormatHeuristic::new(&config),
            config,
            checker,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Fast local heuristic; `true` means nothing was flagged.
    pub fn check(&self, utterance: &str) -> bool {
        self.heuristic.check(utterance)
    }

    /// Binding verdict. Text the heuristic does not flag passes without a
    /// backend call.
    pub async fn deep_check(&self, utterance: &str) -> Result<bool, LlmError> {
        if self.check(utterance) {
            return Ok(true);
        }
        let messages = prompt::checker_messages(utterance, &self.config);
        let params = SamplingParams::new(0.0, CHECKER_MAX_TOKENS);
        let reply = self.checker.send(&messages, &params).await?;
        let verdict = Verdict::parse(&reply.content);
        debug!(?verdict, "Deep check verdict");
        Ok(verdict == Verdict::Compliant)
    }

    /// Repair `utterance` until it passes the deep check or the attempt
    /// budget is spent.
    ///
    /// Compliant input comes back unchanged with no backend call. Gateway
    /// errors stop the loop and the latest text is accepted with a warning.
    pub async fn repair(&self, utterance: &str, ctx: &RepairContext<'_>) -> RepairOutcome {
        let mut current = utterance.to_string();

        match self.deep_check(&current).await {
            Ok(true) => {
                return RepairOutcome {
                    text: current,
                    attempts: 0,
                    status: ValidationStatus::Passed,
                };
            }
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "Deep check unavailable, accepting text unreviewed");
                return accepted_with_warning(current, 0);
            }
        }

        for attempt in 1..=self.config.max_repair_attempts {
            let (messages, params) = if attempt == 1 {
                let violations = self.heuristic.violations(&current);
                let mut messages = ctx.messages.to_vec();
                messages.push(Message::assistant(current.clone()));
                messages.push(Message::user(prompt::repair_feedback(&current, &violations, &self.config)));
                (messages, ctx.params)
            } else {
                (
                    prompt::strict_repair_messages(&current, &self.config),
                    ctx.params.with_temperature(self.config.repair_temperature),
                )
            };

            let regenerated = match ctx.generator.send(&messages, &params).await {
                Ok(response) => (ctx.postprocess)(&response.content),
                Err(err) => {
                    warn!(attempt, error = %err, "Repair generation failed, keeping last text");
                    return accepted_with_warning(current, attempt - 1);
                }
            };
            if !regenerated.trim().is_empty() {
                current = regenerated;
            }

            match self.deep_check(&current).await {
                Ok(true) => {
                    info!(attempt, "Utterance repaired");
                    return RepairOutcome {
                        text: current,
                        attempts: attempt,
                        status: ValidationStatus::Repaired,
                    };
                }
                Ok(false) => debug!(attempt, "Repaired text still non-compliant"),
                Err(err) => {
                    warn!(attempt, error = %err, "Deep check unavailable during repair");
                    return accepted_with_warning(current, attempt);
                }
            }
        }

        warn!(
            attempts = self.config.max_repair_attempts,
            "Repair budget exhausted, accepting non-compliant text"
        );
        accepted_with_warning(current, self.config.max_repair_attempts)
    }
}

fn accepted_with_warning(text: String, attempts: u32) -> RepairOutcome {
    RepairOutcome {
        text,
        attempts,
        status: ValidationStatus::AcceptedWithWarning,
    }
}
