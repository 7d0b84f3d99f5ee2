//! Character and scenario records.
//!
//! Both are loaded once per session from the catalog and never mutated.
//! Serde aliases accept the field names used by existing catalog files.

use serde::{Deserialize, Serialize};

/// Immutable profile of the persona being simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    /// Coarse personality tag, e.g. "neuroticism_high".
    #[serde(default, alias = "personality_type")]
    pub personality_tag: String,
    #[serde(default, alias = "relationship_belief")]
    pub relationship_belief_tag: String,
    #[serde(default, alias = "communication_type")]
    pub communication_tag: String,
    #[serde(default, alias = "attachment_style")]
    pub attachment_tag: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub trigger_topics: Vec<String>,
    #[serde(default)]
    pub coping_mechanisms: Vec<String>,
    /// Scenario this character was generated for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation_id: Option<String>,
}

impl CharacterProfile {
    /// Whether the personality tag carries the given trait marker.
    pub fn has_trait(&self, marker: &str) -> bool {
        self.personality_tag.contains(marker)
    }
}

/// Immutable description of one conflict situation within a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSituation {
    pub scenario_id: String,
    pub situation_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub typical_triggers: Vec<String>,
}

/// One runnable (character, situation) pair for batch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub character_id: String,
    pub scenario_id: String,
    pub situation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_accepts_catalog_field_names() {
        let json = r#"{
            "id": "c1",
            "name": "Lin",
            "age": 27,
            "gender": "female",
            "personality_type": "neuroticism_high",
            "relationship_belief": "destiny",
            "communication_type": "indirect",
            "attachment_style": "anxious",
            "background": "grew up in a small town",
            "trigger_topics": ["late replies"],
            "coping_mechanisms": ["journaling"]
        }"#;
        let profile: CharacterProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.personality_tag, "neuroticism_high");
        assert_eq!(profile.attachment_tag, "anxious");
        assert!(profile.has_trait("neuroticism_high"));
        assert!(!profile.has_trait("openness_high"));
        assert!(profile.scenario_id.is_none());
    }

    #[test]
    fn test_character_minimal_fields() {
        let profile: CharacterProfile =
            serde_json::from_str(r#"{"id":"c2","name":"Wei"}"#).unwrap();
        assert_eq!(profile.age, 0);
        assert!(profile.trigger_topics.is_empty());
    }
}
