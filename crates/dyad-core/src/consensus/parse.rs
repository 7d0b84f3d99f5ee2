//! Parse an expert reply into a structured judgment.
//!
//! Strict JSON first, then lenient field-by-field extraction, then an
//! explicit unusable outcome. Nothing here returns an error to the caller:
//! an unusable reply becomes an "unknown" judgment.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use dyad_types::emotion::{ExpertJudgment, IntensityScale, UNKNOWN_LABEL, clamp_score};
use dyad_types::error::ParseError;

use crate::extract::{
    extract_json_object, field_pattern, json_int, json_list, json_str, lenient_int, lenient_list,
    lenient_text,
};

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["primary_emotion", "主要情绪"], r#"([^",\n}]+)"#)
        .expect("LABEL_RE is a compile-time constant")
});

static INTENSITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["intensity", "强度"], r"(\d+)").expect("INTENSITY_RE is a compile-time constant")
});

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["emotion_score", "情绪分数", "情绪评分"], r"([-+]?\d+)")
        .expect("SCORE_RE is a compile-time constant")
});

static TRIGGERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["key_triggers", "触发点"], r"\[(.*?)\]").expect("TRIGGERS_RE is a compile-time constant")
});

static ANALYSIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["analysis", "分析"], r#"([^"\n]+)"#).expect("ANALYSIS_RE is a compile-time constant")
});

/// Fields recovered from an expert reply.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgmentFields {
    pub primary_emotion: String,
    pub intensity: u32,
    pub emotion_score: i32,
    pub key_triggers: Vec<String>,
    pub analysis: String,
}

/// Outcome of the parse pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum JudgmentParse {
    Strict(JudgmentFields),
    Lenient(JudgmentFields),
    Unusable(ParseError),
}

impl JudgmentParse {
    /// Turn the outcome into a judgment; unusable replies become "unknown".
    pub fn into_judgment(self, expert_id: &str, turn_number: u32) -> ExpertJudgment {
        match self {
            JudgmentParse::Strict(fields) | JudgmentParse::Lenient(fields) => ExpertJudgment {
                expert_id: expert_id.to_string(),
                turn_number,
                primary_emotion: fields.primary_emotion,
                intensity: fields.intensity,
                emotion_score: fields.emotion_score,
                key_triggers: fields.key_triggers,
                analysis: fields.analysis,
                error: None,
                timestamp: Utc::now(),
            },
            JudgmentParse::Unusable(err) => ExpertJudgment::unknown(expert_id, turn_number, err.to_string()),
        }
    }
}

/// Run the strict -> lenient -> unusable pipeline over `reply`.
pub fn parse_judgment(reply: &str, scale: IntensityScale) -> JudgmentParse {
    let strict_err = match strict(reply, scale) {
        Ok(fields) => return JudgmentParse::Strict(fields),
        Err(e) => e,
    };
    match lenient(reply, scale) {
        Some(fields) => JudgmentParse::Lenient(fields),
        None => JudgmentParse::Unusable(strict_err),
    }
}

fn strict(reply: &str, scale: IntensityScale) -> Result<JudgmentFields, ParseError> {
    let map = extract_json_object(reply)?;
    let primary_emotion = json_str(&map, "primary_emotion")
        .and_then(|l| normalize_label(&l))
        .ok_or(ParseError::MissingField("primary_emotion"))?;
    let emotion_score = json_int(&map, "emotion_score").ok_or(ParseError::MissingField("emotion_score"))?;
    let intensity = json_int(&map, "intensity").ok_or(ParseError::MissingField("intensity"))?;

    Ok(JudgmentFields {
        primary_emotion,
        intensity: clamp_intensity(intensity, scale),
        emotion_score: clamp_score(saturate(emotion_score)),
        key_triggers: json_list(&map, "key_triggers"),
        analysis: json_str(&map, "analysis").unwrap_or_default(),
    })
}

/// Keyword scan; needs at least a label and a score.
fn lenient(reply: &str, scale: IntensityScale) -> Option<JudgmentFields> {
    let primary_emotion = lenient_text(&LABEL_RE, reply).and_then(|l| normalize_label(&l))?;
    let emotion_score = lenient_int(&SCORE_RE, reply)?;
    let intensity = lenient_int(&INTENSITY_RE, reply).unwrap_or(i64::from(scale.bounds().0));

    Some(JudgmentFields {
        primary_emotion,
        intensity: clamp_intensity(intensity, scale),
        emotion_score: clamp_score(saturate(emotion_score)),
        key_triggers: lenient_list(&TRIGGERS_RE, reply),
        analysis: lenient_text(&ANALYSIS_RE, reply).unwrap_or_default(),
    })
}

/// Lowercase a label and reject placeholders meaning "unknown".
pub fn normalize_label(label: &str) -> Option<String> {
    let label = label.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_lowercase();
    if label.is_empty() || label == UNKNOWN_LABEL || label == "未知" {
        return None;
    }
    Some(label)
}

fn clamp_intensity(value: i64, scale: IntensityScale) -> u32 {
    scale.clamp(value.clamp(0, i64::from(u32::MAX)) as u32)
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
