//! Per-session and batch summary statistics.

use std::collections::BTreeMap;
use std::path::PathBuf;

use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use serde::Serialize;

use dyad_core::dialogue::engine::had_quality_warnings;
use dyad_types::character::TestCase;
use dyad_types::dialogue::{EndReason, SessionResult};

/// Compact view of one finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub character_id: String,
    pub scenario_id: String,
    pub situation_id: String,
    pub termination_reason: EndReason,
    pub final_score: i32,
    pub turns_completed: u32,
    pub mean_agreement: Option<f64>,
    pub prediction_accuracy: Option<f64>,
    pub quality_warnings: bool,
    pub log_path: Option<PathBuf>,
}

impl SessionSummary {
    pub fn from_result(result: &SessionResult, log_path: Option<PathBuf>) -> Self {
        Self {
            character_id: result.character.id.clone(),
            scenario_id: result.scenario.scenario_id.clone(),
            situation_id: result.scenario.situation_id.clone(),
            termination_reason: result.termination_reason,
            final_score: result.final_score,
            turns_completed: result.turns_completed,
            mean_agreement: result.mean_agreement(),
            prediction_accuracy: result.prediction_accuracy(),
            quality_warnings: had_quality_warnings(result),
            log_path,
        }
    }
}

/// How one batch test case ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Finished(SessionSummary),
    Failed { case: TestCase, error: String },
    Cancelled { case: TestCase },
}

/// Aggregate statistics over a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub finished: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Finished sessions per termination reason.
    pub by_reason: BTreeMap<String, usize>,
    pub mean_final_score: Option<f64>,
    pub mean_turns: Option<f64>,
    /// Mean over sessions that had at least one multi-expert turn.
    pub mean_agreement: Option<f64>,
    /// Mean over sessions with at least one comparable prediction.
    pub mean_prediction_accuracy: Option<f64>,
    pub sessions_with_quality_warnings: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[CaseOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        let mut finished = Vec::new();
        for outcome in outcomes {
            match outcome {
                CaseOutcome::Finished(s) => finished.push(s),
                CaseOutcome::Failed { .. } => summary.failed += 1,
                CaseOutcome::Cancelled { .. } => summary.cancelled += 1,
            }
        }
        summary.finished = finished.len();

        for s in &finished {
            *summary
                .by_reason
                .entry(s.termination_reason.to_string())
                .or_default() += 1;
        }
        summary.mean_final_score = mean(finished.iter().map(|s| f64::from(s.final_score)));
        summary.mean_turns = mean(finished.iter().map(|s| f64::from(s.turns_completed)));
        summary.mean_agreement = mean(finished.iter().filter_map(|s| s.mean_agreement));
        summary.mean_prediction_accuracy = mean(finished.iter().filter_map(|s| s.prediction_accuracy));
        summary.sessions_with_quality_warnings = finished.iter().filter(|s| s.quality_warnings).count();
        summary
    }

    /// Two-column statistics table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Metric").fg(Color::White),
            Cell::new("Value").fg(Color::White),
        ]);

        let row = |table: &mut Table, name: &str, value: String| {
            table.add_row(vec![Cell::new(name).fg(Color::Cyan), Cell::new(value)]);
        };
        row(&mut table, "Sessions", self.total.to_string());
        row(&mut table, "Finished", self.finished.to_string());
        row(&mut table, "Failed", self.failed.to_string());
        row(&mut table, "Cancelled", self.cancelled.to_string());
        for (reason, count) in &self.by_reason {
            row(&mut table, &format!("  ended: {reason}"), count.to_string());
        }
        row(&mut table, "Mean final score", fmt_opt(self.mean_final_score, 2));
        row(&mut table, "Mean turns", fmt_opt(self.mean_turns, 2));
        row(&mut table, "Mean expert agreement", fmt_opt(self.mean_agreement, 3));
        row(&mut table, "Mean prediction accuracy", fmt_opt(self.mean_prediction_accuracy, 3));
        row(
            &mut table,
            "Sessions with quality warnings",
            self.sessions_with_quality_warnings.to_string(),
        );
        table
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

pub fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(reason: EndReason, score: i32, turns: u32, agreement: Option<f64>) -> CaseOutcome {
        CaseOutcome::Finished(SessionSummary {
            character_id: "anxious_01".into(),
            scenario_id: "communication".into(),
            situation_id: "ignored_messages".into(),
            termination_reason: reason,
            final_score: score,
            turns_completed: turns,
            mean_agreement: agreement,
            prediction_accuracy: None,
            quality_warnings: false,
            log_path: None,
        })
    }

    fn case() -> TestCase {
        TestCase {
            character_id: "calm_02".into(),
            scenario_id: "finance".into(),
            situation_id: "big_purchase".into(),
        }
    }

    #[test]
    fn aggregates_finished_sessions_only() {
        let outcomes = vec![
            finished(EndReason::Improvement, 7, 4, Some(1.0)),
            finished(EndReason::Critical, -10, 2, Some(0.5)),
            finished(EndReason::Improvement, 8, 6, None),
            CaseOutcome::Failed {
                case: case(),
                error: "character 'calm_02' not found".into(),
            },
            CaseOutcome::Cancelled { case: case() },
        ];
        let summary = BatchSummary::from_outcomes(&outcomes);

        assert_eq!(summary.total, 5);
        assert_eq!(summary.finished, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.by_reason.get("improvement"), Some(&2));
        assert_eq!(summary.by_reason.get("critical"), Some(&1));
        assert!((summary.mean_final_score.unwrap() - 5.0 / 3.0).abs() < 1e-9);
        assert!((summary.mean_turns.unwrap() - 4.0).abs() < 1e-9);
        assert!((summary.mean_agreement.unwrap() - 0.75).abs() < 1e-9);
        assert_eq!(summary.mean_prediction_accuracy, None);
    }

    #[test]
    fn empty_batch_has_no_means() {
        let summary = BatchSummary::from_outcomes(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.mean_final_score, None);
        assert_eq!(fmt_opt(summary.mean_turns, 2), "-");
    }

    #[test]
    fn table_lists_reasons() {
        let summary = BatchSummary::from_outcomes(&[finished(EndReason::MaxTurns, 0, 10, None)]);
        let rendered = summary.to_table().to_string();
        assert!(rendered.contains("ended: max_turns"));
        assert!(rendered.contains("10.00"));
    }
}
