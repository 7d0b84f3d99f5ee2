//! `dyad run`: one session, one log file.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use dyad_core::dialogue::DialogueSession;
use dyad_core::repository::session_log::SessionLog;
use dyad_types::dialogue::{EndReason, SessionLogRecord, SessionResult, ValidationStatus};

use crate::cli::summary::{SessionSummary, fmt_opt};
use crate::state::AppState;

/// Run a single session, write its log and print the outcome.
pub async fn run_session(
    state: &AppState,
    character_id: &str,
    scenario_id: &str,
    situation_id: &str,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let session = DialogueSession::start_from_repository(
        &state.catalog,
        character_id,
        scenario_id,
        situation_id,
        state.config.clone(),
        state.backends.clone(),
    )
    .await
    .with_context(|| format!("Failed to start session for '{character_id}' in {scenario_id}/{situation_id}"))?;

    let spinner = (!json && !quiet).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!(
            "{} is talking about \"{}\"...",
            session.character().name,
            session.situation().name
        ));
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner
    });

    let prompts = session.prompts().clone();
    let result = session.run_to_completion().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let record = SessionLogRecord::new(result, prompts);
    let log_path = state
        .session_log
        .write(&record)
        .await
        .context("Failed to write session log")?;
    let result = record.result;

    if json {
        let summary = SessionSummary::from_result(&result, Some(log_path));
        let output = serde_json::json!({
            "summary": summary,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    print_transcript(&result);

    let summary = SessionSummary::from_result(&result, Some(log_path.clone()));
    println!();
    println!(
        "  {} {} in \"{}\"",
        style("*").green().bold(),
        style(&result.character.name).cyan().bold(),
        result.scenario.name
    );
    println!(
        "    Ended:        {} after {} turn(s)",
        reason_style(result.termination_reason),
        result.turns_completed
    );
    println!("    Final score:  {}", style(result.final_score).bold());
    println!("    Agreement:    {}", fmt_opt(summary.mean_agreement, 3));
    println!("    Prediction:   {}", fmt_opt(summary.prediction_accuracy, 3));
    if summary.quality_warnings {
        println!(
            "    {}",
            style("Some utterances were accepted with quality warnings").yellow()
        );
    }
    println!("    Log:          {}", style(log_path.display()).dim());
    println!();

    Ok(())
}

fn print_transcript(result: &SessionResult) {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Turn").fg(Color::White),
        Cell::new(&result.character.name).fg(Color::White),
        Cell::new("Partner").fg(Color::White),
        Cell::new("Score").fg(Color::White),
    ]);

    for turn in &result.turns {
        let persona = match turn.persona_validation {
            ValidationStatus::AcceptedWithWarning => Cell::new(&turn.persona_utterance).fg(Color::Yellow),
            _ => Cell::new(&turn.persona_utterance),
        };
        let partner = match &turn.partner_utterance {
            Some(text) => Cell::new(text),
            None => Cell::new("-").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(turn.turn_number),
            persona,
            partner,
            Cell::new(turn.emotion_snapshot.score()).fg(Color::Cyan),
        ]);
    }

    println!();
    println!("{table}");
}

fn reason_style(reason: EndReason) -> console::StyledObject<&'static str> {
    match reason {
        EndReason::Improvement => style(reason.as_str()).green(),
        EndReason::Critical | EndReason::SustainedDecline => style(reason.as_str()).red(),
        EndReason::BackendFailure => style(reason.as_str()).red().bold(),
        EndReason::MaxTurns => style(reason.as_str()).yellow(),
    }
}
