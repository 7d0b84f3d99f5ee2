//! Fast local format heuristic.
//!
//! Flags candidates for the deep check; it never rejects text on its own.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use dyad_types::config::ValidatorConfig;

static BRACKETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\([^)]*\)|（[^）]*）|\[[^\]]*\]|【[^】]*】")
        .expect("BRACKETED_RE is a compile-time constant")
});

/// One reason the heuristic flagged an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DisallowedPunctuation(String),
    LatinRun(String),
    BracketedAside(String),
    MonologueMarker(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DisallowedPunctuation(p) => write!(f, "disallowed punctuation '{p}'"),
            Violation::LatinRun(word) => write!(f, "foreign-language text '{word}'"),
            Violation::BracketedAside(aside) => write!(f, "bracketed stage direction '{aside}'"),
            Violation::MonologueMarker(marker) => write!(f, "leaked inner-monologue marker '{marker}'"),
        }
    }
}

/// Local format rules built from the validator configuration.
#[derive(Debug, Clone)]
pub struct FormatHeuristic {
    forbid_latin: bool,
    latin_run_min: usize,
    monologue_markers: Vec<String>,
    disallowed_punctuation: Vec<String>,
}

impl FormatHeuristic {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            forbid_latin: config.forbid_latin,
            latin_run_min: config.latin_run_min.max(1),
            monologue_markers: config.monologue_markers.clone(),
            disallowed_punctuation: config.disallowed_punctuation.clone(),
        }
    }

    /// `true` when nothing is flagged.
    pub fn check(&self, utterance: &str) -> bool {
        self.violations(utterance).is_empty()
    }

    /// Every flagged span, in rule order.
    pub fn violations(&self, utterance: &str) -> Vec<Violation> {
        let mut found = Vec::new();

        for marker in &self.monologue_markers {
            if !marker.is_empty() && utterance.contains(marker.as_str()) {
                found.push(Violation::MonologueMarker(marker.clone()));
            }
        }
        for punct in &self.disallowed_punctuation {
            if !punct.is_empty() && utterance.contains(punct.as_str()) {
                found.push(Violation::DisallowedPunctuation(punct.clone()));
            }
        }
        for m in BRACKETED_RE.find_iter(utterance) {
            found.push(Violation::BracketedAside(m.as_str().to_string()));
        }
        if self.forbid_latin {
            found.extend(latin_runs(utterance, self.latin_run_min).map(Violation::LatinRun));
        }
        found
    }
}

/// Maximal runs of ASCII letters at least `min_len` long.
fn latin_runs(text: &str, min_len: usize) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(move |run| run.len() >= min_len)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristic() -> FormatHeuristic {
        FormatHeuristic::new(&ValidatorConfig::default())
    }

    #[test]
    fn test_clean_text_passes() {
        let h = heuristic();
        assert!(h.check("你怎么到现在才回我消息？"));
        // Short Latin runs such as "OK" stay below the default threshold.
        assert!(h.check("OK，我知道了。"));
    }

    #[test]
    fn test_latin_run_flagged() {
        let h = heuristic();
        assert_eq!(
            h.violations("我真的很 upset 你知道吗"),
            vec![Violation::LatinRun("upset".into())]
        );
    }

    #[test]
    fn test_latin_allowed_when_disabled() {
        let config = ValidatorConfig {
            forbid_latin: false,
            ..ValidatorConfig::default()
        };
        assert!(FormatHeuristic::new(&config).check("I am upset"));
    }

    #[test]
    fn test_stage_directions_flagged() {
        let h = heuristic();
        let v = h.violations("（叹气）好吧。");
        assert_eq!(v, vec![Violation::BracketedAside("（叹气）".into())]);
        assert!(!h.check("(sighs) fine"));
    }

    #[test]
    fn test_monologue_marker_flagged() {
        let h = heuristic();
        let v = h.violations("好吧【内心】其实我很难过");
        assert!(v.contains(&Violation::MonologueMarker("【内心】".into())));
    }

    #[test]
    fn test_disallowed_punctuation_flagged() {
        let h = heuristic();
        assert!(!h.check("*看向窗外* 随便你"));
        assert!(h.violations("好~").contains(&Violation::DisallowedPunctuation("~".into())));
    }
}
