//! Partner-side prediction of the persona's next emotional state.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use dyad_types::emotion::{EmotionPrediction, IntensityScale, clamp_score};
use dyad_types::error::ParseError;
use dyad_types::llm::{Message, SamplingParams};

use crate::consensus::parse::normalize_label;
use crate::extract::{extract_json_object, field_pattern, json_int, json_str, lenient_int, lenient_text};
use crate::llm::fallback::FallbackChain;

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["predicted_emotion", "预测情绪"], r#"([^",\n}]+)"#)
        .expect("LABEL_RE is a compile-time constant")
});

static INTENSITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["intensity", "强度"], r"(\d+)").expect("INTENSITY_RE is a compile-time constant")
});

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["emotion_score", "情绪分数", "情绪值"], r"([-+]?\d+)")
        .expect("SCORE_RE is a compile-time constant")
});

static EXPLANATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    field_pattern(&["explanation", "解释"], r#"([^"\n]+)"#).expect("EXPLANATION_RE is a compile-time constant")
});

/// Predictions always use the five-point intensity scale.
const PREDICTION_SCALE: IntensityScale = IntensityScale::Likert5;

/// Parse a prediction reply made after `turn_number`.
///
/// Strict JSON first, then a keyword scan needing at least a label.
/// Anything else becomes an "unknown" prediction carrying the parse error.
pub fn parse_prediction(reply: &str, turn_number: u32) -> EmotionPrediction {
    let strict_err = match strict(reply, turn_number) {
        Ok(prediction) => return prediction,
        Err(err) => err,
    };
    lenient(reply, turn_number).unwrap_or_else(|| EmotionPrediction::unknown(turn_number, strict_err.to_string()))
}

fn strict(reply: &str, turn_number: u32) -> Result<EmotionPrediction, ParseError> {
    let map = extract_json_object(reply)?;
    let predicted_emotion = json_str(&map, "predicted_emotion")
        .and_then(|l| normalize_label(&l))
        .ok_or(ParseError::MissingField("predicted_emotion"))?;
    let intensity = json_int(&map, "intensity").ok_or(ParseError::MissingField("intensity"))?;
    Ok(EmotionPrediction {
        turn_number,
        predicted_emotion,
        intensity: clamp_intensity(intensity),
        emotion_score: json_int(&map, "emotion_score").map(to_score),
        explanation: json_str(&map, "explanation").unwrap_or_default(),
        error: None,
    })
}

fn lenient(reply: &str, turn_number: u32) -> Option<EmotionPrediction> {
    let predicted_emotion = lenient_text(&LABEL_RE, reply).and_then(|l| normalize_label(&l))?;
    let intensity = lenient_int(&INTENSITY_RE, reply).unwrap_or(i64::from(PREDICTION_SCALE.bounds().0));
    Some(EmotionPrediction {
        turn_number,
        predicted_emotion,
        intensity: clamp_intensity(intensity),
        emotion_score: lenient_int(&SCORE_RE, reply).map(to_score),
        explanation: lenient_text(&EXPLANATION_RE, reply).unwrap_or_default(),
        error: None,
    })
}

fn clamp_intensity(value: i64) -> u32 {
    PREDICTION_SCALE.clamp(value.clamp(0, i64::from(u32::MAX)) as u32)
}

fn to_score(value: i64) -> i32 {
    clamp_score(value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

/// Ask `chain` for a prediction. Never fails: gateway errors produce an
/// "unknown" prediction.
pub async fn predict(
    chain: &FallbackChain,
    messages: &[Message],
    params: &SamplingParams,
    turn_number: u32,
) -> EmotionPrediction {
    match chain.send(messages, params).await {
        Ok(response) => {
            let prediction = parse_prediction(&response.content, turn_number);
            debug!(turn = turn_number, emotion = %prediction.predicted_emotion, "Emotion prediction");
            prediction
        }
        Err(err) => {
            warn!(turn = turn_number, error = %err, "Prediction call failed");
            EmotionPrediction::unknown(turn_number, format!("gateway error: {err}"))
        }
    }
}
