//! `dyad batch`: every catalog test case on a bounded worker pool.
//!
//! Each session runs in its own task with its own state; a failing session
//! is reported and never affects the others. Ctrl-C stops pending test
//! cases while running sessions finish and write their logs.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dyad_core::dialogue::DialogueSession;
use dyad_core::repository::catalog::CatalogRepository;
use dyad_core::repository::session_log::SessionLog;
use dyad_types::character::TestCase;
use dyad_types::dialogue::SessionLogRecord;

use crate::cli::summary::{BatchSummary, CaseOutcome, SessionSummary};
use crate::state::AppState;

/// Run all test cases and print aggregate statistics.
pub async fn run_batch(
    state: Arc<AppState>,
    workers: Option<usize>,
    character_filter: Option<&str>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let mut cases = state
        .catalog
        .list_test_cases()
        .await
        .context("Failed to list test cases")?;
    if let Some(character) = character_filter {
        cases.retain(|c| c.character_id == character);
    }

    if cases.is_empty() {
        if json {
            println!("{}", serde_json::to_string_pretty(&BatchSummary::default())?);
        } else if !quiet {
            println!();
            println!("  {} No test cases to run.", style("i").blue().bold());
            println!();
        }
        return Ok(());
    }

    let workers = workers.unwrap_or(state.config.batch.max_workers).max(1);
    info!(cases = cases.len(), workers, "Starting batch");

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling pending sessions");
                cancel.cancel();
            }
        }
    });

    let progress = if json || quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(cases.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        bar
    };

    let outcomes = execute(Arc::clone(&state), cases, workers, cancel, progress.clone()).await;
    progress.finish_and_clear();
    ctrl_c.abort();

    let summary = BatchSummary::from_outcomes(&outcomes);
    if json {
        let output = serde_json::json!({
            "summary": summary,
            "sessions": outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!();
    for outcome in &outcomes {
        if let CaseOutcome::Failed { case, error } = outcome {
            println!(
                "  {} {} in {}/{}: {}",
                style("x").red().bold(),
                style(&case.character_id).cyan(),
                case.scenario_id,
                case.situation_id,
                error
            );
        }
    }
    println!("{}", summary.to_table());
    println!(
        "  Session logs in {}",
        style(state.session_log.dir().display()).dim()
    );
    println!();

    Ok(())
}

/// Fan test cases out over at most `workers` concurrent sessions.
///
/// Outcomes come back in completion order.
pub async fn execute(
    state: Arc<AppState>,
    cases: Vec<TestCase>,
    workers: usize,
    cancel: CancellationToken,
    progress: ProgressBar,
) -> Vec<CaseOutcome> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    // A task that panics takes its case with it; keep a copy per task id.
    let mut pending: HashMap<task::Id, TestCase> = HashMap::with_capacity(cases.len());

    for case in cases {
        let state = Arc::clone(&state);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let tracked = case.clone();
        let handle = set.spawn(async move {
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return CaseOutcome::Cancelled { case };
            };
            if cancel.is_cancelled() {
                return CaseOutcome::Cancelled { case };
            }
            run_case(&state, case).await
        });
        pending.insert(handle.id(), tracked);
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next_with_id().await {
        let outcome = match joined {
            Ok((id, outcome)) => {
                pending.remove(&id);
                outcome
            }
            Err(err) => {
                let Some(case) = pending.remove(&err.id()) else {
                    warn!(error = %err, "Session task aborted");
                    continue;
                };
                error!(
                    character = %case.character_id,
                    situation = %case.situation_id,
                    error = %err,
                    "Session task aborted"
                );
                CaseOutcome::Failed {
                    case,
                    error: format!("session task aborted: {err}"),
                }
            }
        };
        if let CaseOutcome::Finished(summary) = &outcome {
            progress.set_message(format!(
                "{} -> {}",
                summary.character_id, summary.termination_reason
            ));
        }
        progress.inc(1);
        outcomes.push(outcome);
    }
    outcomes
}

async fn run_case(state: &AppState, case: TestCase) -> CaseOutcome {
    let session = match DialogueSession::start_from_repository(
        &state.catalog,
        &case.character_id,
        &case.scenario_id,
        &case.situation_id,
        state.config.clone(),
        state.backends.clone(),
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            warn!(
                character = %case.character_id,
                situation = %case.situation_id,
                error = %err,
                "Session could not start"
            );
            return CaseOutcome::Failed {
                case,
                error: err.to_string(),
            };
        }
    };

    let prompts = session.prompts().clone();
    let result = session.run_to_completion().await;
    let record = SessionLogRecord::new(result, prompts);
    let log_path = match state.session_log.write(&record).await {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(character = %case.character_id, error = %err, "Session log not written");
            None
        }
    };
    CaseOutcome::Finished(SessionSummary::from_result(&record.result, log_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyad_core::consensus::ConsensusAggregator;
    use dyad_core::dialogue::SessionBackends;
    use dyad_core::llm::box_provider::BoxLlmProvider;
    use dyad_core::llm::fallback::{FallbackChain, RetryPolicy};
    use dyad_core::llm::provider::LlmProvider;
    use dyad_infra::catalog::JsonCatalog;
    use dyad_infra::session_log::JsonSessionLog;
    use dyad_types::config::SimulationConfig;
    use dyad_types::dialogue::EndReason;
    use dyad_types::llm::{CompletionRequest, CompletionResponse, LlmError, Usage};
    use tempfile::TempDir;

    /// Replies with the same text to every request.
    struct Canned(&'static str);

    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned-model"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                id: "r".into(),
                content: self.0.to_string(),
                model: "canned-model".into(),
                usage: Usage::default(),
                raw: serde_json::Value::Null,
            })
        }
    }

    /// Panics inside the session task.
    struct Exploding;

    impl LlmProvider for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn model(&self) -> &str {
            "exploding-model"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            panic!("provider blew up")
        }
    }

    const CATALOG: &str = r#"{
        "character_profiles": [
            {"id": "anxious_01", "name": "Lin", "scenario_id": "communication"},
            {"id": "calm_02", "name": "Zhou", "scenario_id": "communication", "situation_id": "ignored_messages"}
        ],
        "conflict_scenarios": [
            {"id": "communication", "situations": [
                {"id": "ignored_messages", "name": "Ignored messages"},
                {"id": "interrupting", "name": "Interrupting"}
            ]}
        ]
    }"#;

    fn state(log_dir: &std::path::Path) -> AppState {
        let chain = |text: &'static str| Arc::new(FallbackChain::single(BoxLlmProvider::new(Canned(text)), RetryPolicy::default()));
        let mut config = SimulationConfig::default();
        config.engine.max_turns = 2;
        config.engine.consensus_enabled = false;
        config.engine.rng_seed = Some(3);
        AppState {
            config,
            catalog: JsonCatalog::from_json(CATALOG).unwrap(),
            backends: SessionBackends {
                persona: chain("我知道了。"),
                partner: chain("我们好好谈谈吧。"),
                checker: chain("是"),
                experts: ConsensusAggregator::new(Vec::new()),
            },
            session_log: JsonSessionLog::new(log_dir),
        }
    }

    #[tokio::test]
    async fn runs_every_case_and_writes_logs() {
        let tmp = TempDir::new().unwrap();
        let state = Arc::new(state(tmp.path()));
        let cases = state.catalog.list_test_cases().await.unwrap();
        assert_eq!(cases.len(), 3);

        let outcomes = execute(
            Arc::clone(&state),
            cases,
            2,
            CancellationToken::new(),
            ProgressBar::hidden(),
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            match outcome {
                CaseOutcome::Finished(s) => {
                    assert_eq!(s.termination_reason, EndReason::MaxTurns);
                    assert_eq!(s.turns_completed, 2);
                    assert!(s.log_path.as_ref().is_some_and(|p| p.exists()));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        let logs = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(logs, 3);
    }

    #[tokio::test]
    async fn missing_character_fails_only_its_case() {
        let tmp = TempDir::new().unwrap();
        let state = Arc::new(state(tmp.path()));
        let cases = vec![
            TestCase {
                character_id: "ghost".into(),
                scenario_id: "communication".into(),
                situation_id: "interrupting".into(),
            },
            TestCase {
                character_id: "calm_02".into(),
                scenario_id: "communication".into(),
                situation_id: "ignored_messages".into(),
            },
        ];

        let outcomes = execute(state, cases, 1, CancellationToken::new(), ProgressBar::hidden()).await;
        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.finished, 1);
    }

    #[tokio::test]
    async fn panicked_sessions_count_as_failed() {
        let tmp = TempDir::new().unwrap();
        let mut state = state(tmp.path());
        state.backends.persona = Arc::new(FallbackChain::single(
            BoxLlmProvider::new(Exploding),
            RetryPolicy::default(),
        ));
        let state = Arc::new(state);
        let cases = state.catalog.list_test_cases().await.unwrap();

        let outcomes = execute(state, cases, 2, CancellationToken::new(), ProgressBar::hidden()).await;

        assert_eq!(outcomes.len(), 3);
        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 3);
        let mut failed: Vec<&str> = outcomes
            .iter()
            .map(|o| match o {
                CaseOutcome::Failed { case, error } => {
                    assert!(error.contains("panicked"), "unexpected error {error}");
                    case.situation_id.as_str()
                }
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        failed.sort_unstable();
        assert_eq!(failed, vec!["ignored_messages", "ignored_messages", "interrupting"]);
    }

    #[tokio::test]
    async fn cancelled_batch_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let state = Arc::new(state(tmp.path()));
        let cases = state.catalog.list_test_cases().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = execute(state, cases, 2, cancel, ProgressBar::hidden()).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| matches!(o, CaseOutcome::Cancelled { .. })));
        assert!(!tmp.path().exists() || std::fs::read_dir(tmp.path()).unwrap().count() == 0);
    }
}
