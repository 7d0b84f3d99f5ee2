//! Dialogue Turn Engine.
//!
//! Drives one session through `Init -> PersonaTurn -> PartnerTurn ->
//! PersonaTurn -> ... -> Terminated`. Each `advance()` produces one persona
//! utterance, updates the emotion tracker, evaluates the termination policy
//! and only then asks the partner to reply. Turns are strictly sequential;
//! the only intra-turn parallelism is the expert fan-out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use dyad_types::character::{CharacterProfile, ScenarioSituation};
use dyad_types::config::SimulationConfig;
use dyad_types::dialogue::{DialogueTurn, EndReason, SessionPrompts, SessionResult, ValidationStatus};
use dyad_types::emotion::{ConsensusRecord, EmotionPrediction, EmotionSnapshot, EmotionUpdateSignal};
use dyad_types::error::SessionError;
use dyad_types::llm::{Message, SamplingParams};

use super::prediction::predict;
use super::reply::{SelfReport, spoken_text, split_persona_reply};
use crate::consensus::{ConsensusAggregator, aggregate, summarize};
use crate::emotion::tracker::EmotionTracker;
use crate::llm::fallback::FallbackChain;
use crate::prompt::{self, Exchange};
use crate::repository::catalog::CatalogRepository;
use crate::validator::{RepairContext, ResponseValidator};

/// Gateway chains for every role of a session.
///
/// Chains are stateless and shared, so one set of backends can serve many
/// concurrent sessions.
#[derive(Debug, Clone)]
pub struct SessionBackends {
    pub persona: Arc<FallbackChain>,
    pub partner: Arc<FallbackChain>,
    pub checker: Arc<FallbackChain>,
    pub experts: ConsensusAggregator,
}

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    PersonaTurn,
    PartnerTurn,
    Terminated,
}

/// One dialogue session between the persona and the partner.
pub struct DialogueSession {
    character: CharacterProfile,
    situation: ScenarioSituation,
    config: SimulationConfig,
    backends: SessionBackends,
    validator: ResponseValidator,
    tracker: EmotionTracker,
    prompts: SessionPrompts,
    /// Persona-side conversation: partner lines as user, persona lines as assistant.
    persona_history: Vec<Message>,
    /// Partner-side conversation: persona lines as user, partner lines as assistant.
    partner_history: Vec<Message>,
    exchanges: Vec<Exchange>,
    turns: Vec<DialogueTurn>,
    consensus: Vec<ConsensusRecord>,
    predictions: Vec<EmotionPrediction>,
    state: SessionState,
    end_reason: Option<EndReason>,
    started_at: DateTime<Utc>,
}

impl DialogueSession {
    /// Construct a session and seed its emotion score.
    ///
    /// Fails fast on an invalid configuration.
    pub fn start(
        character: CharacterProfile,
        situation: ScenarioSituation,
        config: SimulationConfig,
        backends: SessionBackends,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let mut rng = match config.engine.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let tracker = EmotionTracker::seed(&character, config.emotion.clone(), &mut rng);
        let prompts = SessionPrompts {
            persona_system: prompt::persona_system_prompt(&character, &situation, &config.validator),
            partner_system: prompt::partner_system_prompt(&character, &situation),
        };
        let validator = ResponseValidator::new(config.validator.clone(), Arc::clone(&backends.checker));

        info!(
            character = %character.id,
            scenario = %situation.scenario_id,
            situation = %situation.situation_id,
            seed_score = tracker.current_score(),
            max_turns = config.engine.max_turns,
            "Session started"
        );

        Ok(Self {
            character,
            situation,
            config,
            backends,
            validator,
            tracker,
            prompts,
            persona_history: Vec::new(),
            partner_history: Vec::new(),
            exchanges: Vec::new(),
            turns: Vec::new(),
            consensus: Vec::new(),
            predictions: Vec::new(),
            state: SessionState::Init,
            end_reason: None,
            started_at: Utc::now(),
        })
    }

    /// Resolve the character and situation from `repository`, then start.
    pub async fn start_from_repository<R: CatalogRepository>(
        repository: &R,
        character_id: &str,
        scenario_id: &str,
        situation_id: &str,
        config: SimulationConfig,
        backends: SessionBackends,
    ) -> Result<Self, SessionError> {
        let character = repository.resolve_character(character_id).await?;
        let situation = repository.resolve_situation(scenario_id, situation_id).await?;
        Self::start(character, situation, config, backends)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn character(&self) -> &CharacterProfile {
        &self.character
    }

    pub fn situation(&self) -> &ScenarioSituation {
        &self.situation
    }

    pub fn prompts(&self) -> &SessionPrompts {
        &self.prompts
    }

    pub fn turns(&self) -> &[DialogueTurn] {
        &self.turns
    }

    pub fn snapshots(&self) -> &[EmotionSnapshot] {
        self.tracker.snapshots()
    }

    pub fn current_score(&self) -> i32 {
        self.tracker.current_score()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Play one turn and return it.
    ///
    /// A persona backend failure terminates the session with
    /// `BackendFailure` and returns the gateway error; no turn is recorded.
    /// A partner backend failure records the persona-only turn and
    /// terminates the same way.
    pub async fn advance(&mut self) -> Result<DialogueTurn, SessionError> {
        if self.state == SessionState::Terminated {
            return Err(SessionError::AlreadyTerminated);
        }
        let turn_number = self.turns.len() as u32 + 1;
        self.play_turn(turn_number).await
    }

    /// Advance until terminated and return the finalized result.
    ///
    /// Never fails: backend errors end the session early with
    /// `BackendFailure`.
    pub async fn run_to_completion(mut self) -> SessionResult {
        while self.state != SessionState::Terminated {
            if let Err(err) = self.advance().await {
                warn!(character = %self.character.id, error = %err, "Turn failed");
                if self.state != SessionState::Terminated {
                    self.terminate(EndReason::BackendFailure);
                }
            }
        }
        self.finalize()
    }

    #[tracing::instrument(
        name = "dialogue.turn",
        skip(self),
        fields(character = %self.character.id, situation = %self.situation.situation_id)
    )]
    async fn play_turn(&mut self, turn_number: u32) -> Result<DialogueTurn, SessionError> {
        self.state = SessionState::PersonaTurn;
        let engine = &self.config.engine;
        let persona_params = SamplingParams::new(engine.persona_temperature, engine.max_tokens);
        let partner_params = SamplingParams::new(engine.partner_temperature, engine.max_tokens);

        // Persona speaks, replying to the last partner line.
        let cue = self
            .exchanges
            .last()
            .and_then(|e| e.partner.clone())
            .unwrap_or_else(|| prompt::opening_cue(&self.situation));
        let mut persona_messages = Vec::with_capacity(self.persona_history.len() + 2);
        persona_messages.push(Message::system(self.prompts.persona_system.clone()));
        persona_messages.extend(self.persona_history.iter().cloned());
        persona_messages.push(Message::user(cue.clone()));

        let (persona_raw, persona_payload) = match self.backends.persona.send(&persona_messages, &persona_params).await {
            Ok(response) => (response.content, response.raw),
            Err(err) => {
                warn!(turn = turn_number, error = %err, "Persona backend failed");
                self.terminate(EndReason::BackendFailure);
                return Err(err.into());
            }
        };

        let markers = self.config.validator.monologue_markers.clone();
        let reply = split_persona_reply(&persona_raw, &markers);
        let strip = move |text: &str| spoken_text(text, &markers);
        let persona_outcome = {
            let ctx = RepairContext {
                generator: &self.backends.persona,
                messages: &persona_messages,
                params: persona_params,
                postprocess: &strip,
            };
            self.validator.repair(&reply.spoken, &ctx).await
        };
        let persona_text = persona_outcome.text;

        // Score the turn, then decide before the partner replies.
        let signal = self.emotion_signal(turn_number, &persona_text, &reply.self_report).await;
        let snapshot = self.tracker.update(turn_number, &signal).clone();
        let end = self
            .tracker
            .evaluate_termination(turn_number, self.config.engine.max_turns);

        let mut turn = DialogueTurn {
            turn_number,
            persona_utterance: persona_text.clone(),
            persona_raw,
            persona_payload,
            inner_monologue: reply.inner_monologue,
            persona_validation: persona_outcome.status,
            partner_utterance: None,
            partner_validation: None,
            partner_payload: None,
            emotion_snapshot: snapshot,
            ended: false,
            end_reason: None,
        };

        if let Some(reason) = end {
            self.exchanges.push(Exchange {
                persona: persona_text,
                partner: None,
            });
            return Ok(self.close_turn(turn, reason));
        }

        // Partner replies to the cleaned persona line.
        self.state = SessionState::PartnerTurn;
        let mut partner_messages = Vec::with_capacity(self.partner_history.len() + 2);
        partner_messages.push(Message::system(self.prompts.partner_system.clone()));
        partner_messages.extend(self.partner_history.iter().cloned());
        partner_messages.push(Message::user(persona_text.clone()));

        let (partner_raw, partner_payload) = match self.backends.partner.send(&partner_messages, &partner_params).await {
            Ok(response) => (response.content, response.raw),
            Err(err) => {
                warn!(turn = turn_number, error = %err, "Partner backend failed");
                self.exchanges.push(Exchange {
                    persona: persona_text,
                    partner: None,
                });
                return Ok(self.close_turn(turn, EndReason::BackendFailure));
            }
        };

        let trim = |text: &str| text.trim().to_string();
        let partner_outcome = {
            let ctx = RepairContext {
                generator: &self.backends.partner,
                messages: &partner_messages,
                params: partner_params,
                postprocess: &trim,
            };
            self.validator.repair(partner_raw.trim(), &ctx).await
        };
        let partner_text = partner_outcome.text;

        self.persona_history.push(Message::user(cue));
        self.persona_history.push(Message::assistant(persona_text.clone()));
        self.partner_history.push(Message::user(persona_text.clone()));
        self.partner_history.push(Message::assistant(partner_text.clone()));
        self.exchanges.push(Exchange {
            persona: persona_text,
            partner: Some(partner_text.clone()),
        });

        if self.config.engine.prediction_enabled {
            let transcript = prompt::format_transcript(&self.character.name, &self.exchanges);
            let messages = prompt::prediction_messages(&self.character, &self.situation, &transcript);
            let prediction = predict(&self.backends.partner, &messages, &partner_params, turn_number).await;
            self.predictions.push(prediction);
        }

        turn.partner_utterance = Some(partner_text);
        turn.partner_validation = Some(partner_outcome.status);
        turn.partner_payload = Some(partner_payload);
        debug!(
            turn = turn_number,
            score = turn.emotion_snapshot.score(),
            delta = turn.emotion_snapshot.delta(),
            "Turn completed"
        );
        self.turns.push(turn.clone());
        self.state = SessionState::PersonaTurn;
        Ok(turn)
    }

    /// Pick this turn's single update signal.
    ///
    /// A usable consensus wins over the persona's self-report; with neither
    /// the score carries forward. Experts see a provisional transcript with
    /// the new persona line that is never merged into the session.
    async fn emotion_signal(
        &mut self,
        turn_number: u32,
        persona_text: &str,
        self_report: &SelfReport,
    ) -> EmotionUpdateSignal {
        if self.config.engine.consensus_enabled && !self.backends.experts.is_empty() {
            let mut provisional = self.exchanges.clone();
            provisional.push(Exchange {
                persona: persona_text.to_string(),
                partner: None,
            });
            let transcript = prompt::format_transcript(&self.character.name, &provisional);
            let (character, situation) = (&self.character, &self.situation);
            let judgments = self
                .backends
                .experts
                .collect(turn_number, |scale| {
                    prompt::expert_messages(character, situation, &transcript, turn_number, scale)
                })
                .await;

            self.consensus.push(summarize(turn_number, &judgments));
            let (signal, _) = aggregate(&judgments);
            if signal != EmotionUpdateSignal::NoUpdate {
                return signal;
            }
            debug!(turn = turn_number, "No usable expert judgment, falling back to self-report");
        }

        match self_report.score {
            Some(score) => EmotionUpdateSignal::Direct {
                score,
                emotions: self_report.emotions.clone(),
            },
            None => EmotionUpdateSignal::NoUpdate,
        }
    }

    fn close_turn(&mut self, mut turn: DialogueTurn, reason: EndReason) -> DialogueTurn {
        turn.ended = true;
        turn.end_reason = Some(reason);
        self.turns.push(turn.clone());
        self.terminate(reason);
        turn
    }

    fn terminate(&mut self, reason: EndReason) {
        let (character, turns, score) = (&self.character.id, self.turns.len(), self.tracker.current_score());
        if reason == EndReason::BackendFailure {
            error!(%character, turns, score, reason = %reason, "Session terminated");
        } else {
            info!(%character, turns, score, reason = %reason, "Session terminated");
        }
        self.end_reason = Some(reason);
        self.state = SessionState::Terminated;
    }

    fn finalize(self) -> SessionResult {
        let final_score = self.tracker.current_score();
        let turns_completed = self.turns.len() as u32;
        SessionResult {
            character: self.character,
            scenario: self.situation,
            turns: self.turns,
            snapshots: self.tracker.into_snapshots(),
            final_score,
            turns_completed,
            termination_reason: self.end_reason.unwrap_or(EndReason::BackendFailure),
            consensus: self.consensus,
            predictions: self.predictions,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for DialogueSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueSession")
            .field("character", &self.character.id)
            .field("situation", &self.situation.situation_id)
            .field("state", &self.state)
            .field("turns", &self.turns.len())
            .field("score", &self.tracker.current_score())
            .finish()
    }
}

/// Whether any utterance of `result` was accepted with a quality warning.
pub fn had_quality_warnings(result: &SessionResult) -> bool {
    result.turns.iter().any(|t| {
        t.persona_validation == ValidationStatus::AcceptedWithWarning
            || t.partner_validation == Some(ValidationStatus::AcceptedWithWarning)
    })
}
