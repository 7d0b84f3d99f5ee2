//! Prompt assembly for every model role in a session.
//!
//! Wording lives here so the engine, validator and aggregator only deal in
//! message lists.

use dyad_types::character::{CharacterProfile, ScenarioSituation};
use dyad_types::config::ValidatorConfig;
use dyad_types::emotion::IntensityScale;
use dyad_types::llm::Message;

use crate::validator::heuristic::Violation;

/// Marker used when the configuration lists none.
pub const DEFAULT_MONOLOGUE_MARKER: &str = "【内心】";

/// One persona/partner exchange of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub persona: String,
    pub partner: Option<String>,
}

fn primary_marker(config: &ValidatorConfig) -> &str {
    config
        .monologue_markers
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_MONOLOGUE_MARKER)
}

fn conflict_line(situation: &ScenarioSituation) -> String {
    if situation.example.is_empty() {
        format!("{}: {}", situation.name, situation.description)
    } else {
        format!("{}: {} (for example: {})", situation.name, situation.description, situation.example)
    }
}

fn profile_block(character: &CharacterProfile) -> String {
    format!(
        "- Name: {}\n- Age: {}\n- Gender: {}\n- Background: {}\n- Personality: {}\n- Relationship belief: {}\n- Communication style: {}\n- Attachment style: {}\n- Trigger topics: {}\n- Coping mechanisms: {}",
        character.name,
        character.age,
        character.gender,
        character.background,
        character.personality_tag,
        character.relationship_belief_tag,
        character.communication_tag,
        character.attachment_tag,
        character.trigger_topics.join(", "),
        character.coping_mechanisms.join(", "),
    )
}

/// Output rules shared by the persona prompt and the repair prompts.
pub fn format_rules(config: &ValidatorConfig) -> String {
    let mut rules = vec![
        "Write only the words you say out loud, as plain dialogue.".to_string(),
        "No stage directions, actions or narration in brackets or parentheses.".to_string(),
    ];
    if config.forbid_latin {
        rules.push("Use only the language of the conversation; no Latin-alphabet words.".to_string());
    }
    if !config.disallowed_punctuation.is_empty() {
        rules.push(format!(
            "Never use these characters: {}",
            config.disallowed_punctuation.join(" ")
        ));
    }
    rules
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {r}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt for the persona role.
///
/// Asks for the spoken reply, then a marked inner monologue and the
/// self-report lines the engine strips before the partner sees the text.
pub fn persona_system_prompt(
    character: &CharacterProfile,
    situation: &ScenarioSituation,
    config: &ValidatorConfig,
) -> String {
    let marker = primary_marker(config);
    format!(
        "You are role-playing {name}. Stay fully in character.\n\n\
         ## Profile\n{profile}\n\n\
         ## Situation\nYou are in a conflict with your partner about: {conflict}\n\n\
         ## Output rules\n{rules}\n\n\
         After your spoken reply, add your private inner monologue between two {marker} markers; \
         your partner never sees it. Then report your state on two separate lines:\n\
         情绪: {{emotion1, emotion2}}\n\
         情绪值: {{score}}\n\
         The score ranges from -10 (extremely negative) through 0 (neutral) to +10 (extremely positive) \
         and should move gradually as the conversation develops.",
        name = character.name,
        profile = profile_block(character),
        conflict = conflict_line(situation),
        rules = format_rules(config),
    )
}

/// System prompt for the partner role.
pub fn partner_system_prompt(character: &CharacterProfile, situation: &ScenarioSituation) -> String {
    format!(
        "You are {name}'s romantic partner. The two of you are discussing: {conflict}\n\n\
         Express your own view but try to understand {name}. Respond naturally, not perfectly; \
         work toward a resolution without rushing to reconcile. \
         Reply with spoken words only: no emotion ratings, inner monologue or stage directions.",
        name = character.name,
        conflict = conflict_line(situation),
    )
}

/// Opening line handed to the persona on turn 1, when no partner line exists.
pub fn opening_cue(situation: &ScenarioSituation) -> String {
    format!(
        "The conversation starts now. Open it the way you would in this situation: {}",
        situation.name
    )
}

/// Render the transcript as labelled lines.
pub fn format_transcript(character_name: &str, exchanges: &[Exchange]) -> String {
    let mut out = String::new();
    for (i, exchange) in exchanges.iter().enumerate() {
        out.push_str(&format!("Turn {}:\n{character_name}: {}\n", i + 1, exchange.persona));
        if let Some(partner) = &exchange.partner {
            out.push_str(&format!("Partner: {partner}\n"));
        }
    }
    out
}

/// Evaluation request for one expert.
pub fn expert_messages(
    character: &CharacterProfile,
    situation: &ScenarioSituation,
    transcript: &str,
    turn_number: u32,
    scale: IntensityScale,
) -> Vec<Message> {
    let (lo, hi) = scale.bounds();
    let system = "You are a clinical psychologist specialising in couples' emotional dynamics. \
                  Assess emotions objectively from the dialogue only.";
    let user = format!(
        "Assess {name}'s emotional state after turn {turn_number}.\n\n\
         ## Profile\n{profile}\n\n\
         ## Conflict\n{conflict}\n\n\
         ## Dialogue\n{transcript}\n\
         Reply with a single JSON object:\n\
         {{\"primary_emotion\": \"<label>\", \"intensity\": <{lo}-{hi}>, \"emotion_score\": <-10 to 10>, \
         \"key_triggers\": [\"...\"], \"analysis\": \"<one or two sentences>\"}}",
        name = character.name,
        profile = profile_block(character),
        conflict = conflict_line(situation),
    );
    vec![Message::system(system), Message::user(user)]
}

/// Request asking the partner backend to predict the persona's next state.
pub fn prediction_messages(
    character: &CharacterProfile,
    situation: &ScenarioSituation,
    transcript: &str,
) -> Vec<Message> {
    let user = format!(
        "Based on the dialogue so far, predict how {name} will feel in their next reply.\n\n\
         ## Conflict\n{conflict}\n\n\
         ## Dialogue\n{transcript}\n\
         Reply with a single JSON object:\n\
         {{\"predicted_emotion\": \"<label>\", \"intensity\": <1-5>, \"emotion_score\": <-10 to 10>, \
         \"explanation\": \"<one sentence>\"}}",
        name = character.name,
        conflict = conflict_line(situation),
    );
    vec![Message::user(user)]
}

/// Binary compliance question for the deep check.
pub fn checker_messages(utterance: &str, config: &ValidatorConfig) -> Vec<Message> {
    let system = "You review dialogue lines for format compliance. \
                  Answer with exactly one word: COMPLIANT or NON_COMPLIANT.";
    let user = format!(
        "Checklist:\n{rules}\n{marker_rule}\n\nLine to review:\n\"\"\"\n{utterance}\n\"\"\"",
        rules = format_rules(config),
        marker_rule = format!(
            "{}. No inner-monologue markers ({}).",
            rule_count(config) + 1,
            config.monologue_markers.join(", ")
        ),
    );
    vec![Message::system(system), Message::user(user)]
}

fn rule_count(config: &ValidatorConfig) -> usize {
    2 + usize::from(config.forbid_latin) + usize::from(!config.disallowed_punctuation.is_empty())
}

/// First repair request: restates the rules with the offending spans as
/// negative examples.
pub fn repair_feedback(rejected: &str, violations: &[Violation], config: &ValidatorConfig) -> String {
    let examples = if violations.is_empty() {
        "- the reply did not follow the output rules".to_string()
    } else {
        violations
            .iter()
            .map(|v| format!("- {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Your previous reply broke the output rules:\n\"\"\"\n{rejected}\n\"\"\"\n\
         Do NOT write anything like:\n{examples}\n\n\
         Output rules:\n{rules}\n\nGive the same reply again following every rule.",
        rules = format_rules(config),
    )
}

/// Second, stricter repair request with a minimal instruction.
pub fn strict_repair_messages(rejected: &str, config: &ValidatorConfig) -> Vec<Message> {
    let mut constraints = vec!["plain spoken words only", "no brackets or actions"];
    if config.forbid_latin {
        constraints.push("no Latin letters");
    }
    vec![
        Message::system(format!(
            "Rewrite the line keeping its meaning. Constraints: {}. Output the rewritten line and nothing else.",
            constraints.join("; ")
        )),
        Message::user(rejected.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_character, sample_situation};

    #[test]
    fn test_persona_prompt_names_marker_and_self_report() {
        let prompt = persona_system_prompt(
            &sample_character("neuroticism_high"),
            &sample_situation(),
            &ValidatorConfig::default(),
        );
        assert!(prompt.contains("Lin"));
        assert!(prompt.contains("【内心】"));
        assert!(prompt.contains("情绪值: {score}"));
        assert!(prompt.contains("Ignored messages"));
    }

    #[test]
    fn test_transcript_omits_missing_partner_line() {
        let transcript = format_transcript(
            "Lin",
            &[
                Exchange {
                    persona: "你又不回我".into(),
                    partner: Some("我在开会".into()),
                },
                Exchange {
                    persona: "算了".into(),
                    partner: None,
                },
            ],
        );
        assert_eq!(transcript, "Turn 1:\nLin: 你又不回我\nPartner: 我在开会\nTurn 2:\nLin: 算了\n");
    }

    #[test]
    fn test_expert_prompt_uses_scale_bounds() {
        let messages = expert_messages(
            &sample_character(""),
            &sample_situation(),
            "Turn 1:\nLin: hi\n",
            1,
            IntensityScale::Percent,
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("<0-100>"));
    }

    #[test]
    fn test_repair_feedback_lists_violations() {
        let text = repair_feedback(
            "(sighs) fine",
            &[Violation::BracketedAside("(sighs)".into())],
            &ValidatorConfig::default(),
        );
        assert!(text.contains("bracketed stage direction '(sighs)'"));
        assert!(text.contains("Output rules"));
    }

    #[test]
    fn test_checker_rules_are_numbered_consecutively() {
        let messages = checker_messages("hi", &ValidatorConfig::default());
        assert!(messages[1].content.contains("5. No inner-monologue markers"));
    }
}
