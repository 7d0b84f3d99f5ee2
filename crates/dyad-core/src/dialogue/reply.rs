//! Persona reply decomposition.
//!
//! A raw persona reply carries three things: the spoken line, an inner
//! monologue between markers, and a self-report of emotions and score.
//! Only the spoken part is validated and shown to the partner.

use std::sync::LazyLock;

use regex::Regex;

use dyad_types::emotion::clamp_score;

static EMOTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:情绪|emotions)\s*[:：]\s*\{([^}]*)\}").expect("EMOTIONS_RE is a compile-time constant")
});

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:情绪值|emotion_score)\s*[:：]\s*\{?\s*([-+]?\d+)\s*\}?")
        .expect("SCORE_RE is a compile-time constant")
});

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("BLANK_LINES_RE is a compile-time constant"));

/// Emotions and score the persona reported about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfReport {
    pub emotions: Vec<String>,
    /// Clamped to the score range; `None` when the reply carries no score.
    pub score: Option<i32>,
}

/// A persona reply split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaReply {
    pub spoken: String,
    pub inner_monologue: String,
    pub self_report: SelfReport,
}

/// Split a raw persona reply.
pub fn split_persona_reply(raw: &str, markers: &[String]) -> PersonaReply {
    let self_report = parse_self_report(raw);

    let mut monologue = Vec::new();
    let mut text = raw.to_string();
    for marker in markers.iter().filter(|m| !m.is_empty()) {
        text = take_monologue(&text, marker, &mut monologue);
    }

    let inner_monologue = monologue
        .iter()
        .map(|part| strip_self_report(part))
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let without_report = strip_self_report(&text);
    let kept: Vec<&str> = without_report
        .lines()
        .filter(|line| !markers.iter().any(|m| !m.is_empty() && line.contains(m.as_str())))
        .collect();
    let spoken = BLANK_LINES_RE.replace_all(&kept.join("\n"), "\n").trim().to_string();

    PersonaReply {
        spoken,
        inner_monologue,
        self_report,
    }
}

/// Just the spoken part of a raw reply.
pub fn spoken_text(raw: &str, markers: &[String]) -> String {
    split_persona_reply(raw, markers).spoken
}

/// Parse the `情绪: {..}` / `情绪值: {..}` lines (or their English keys).
pub fn parse_self_report(raw: &str) -> SelfReport {
    let emotions = EMOTIONS_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split([',', '，', '、'])
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let score = SCORE_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .map(clamp_score);
    SelfReport { emotions, score }
}

fn strip_self_report(text: &str) -> String {
    let text = EMOTIONS_RE.replace_all(text, "");
    SCORE_RE.replace_all(&text, "").into_owned()
}

/// Remove `marker ... marker` blocks (or an unterminated trailing block),
/// collecting their contents.
fn take_monologue(text: &str, marker: &str, monologue: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(marker) {
        out.push_str(&rest[..start]);
        let after = &rest[start + marker.len()..];
        match after.find(marker) {
            Some(end) => {
                monologue.push(after[..end].to_string());
                rest = &after[end + marker.len()..];
            }
            None => {
                monologue.push(after.to_string());
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
