//! JSON-backed scenario/character catalog.
//!
//! Format:
//! ```text
//! {
//!   "character_profiles": [ { "id": "...", "name": "...", ... } ],
//!   "conflict_scenarios": [
//!     { "id": "communication", "name": "...", "description": "...",
//!       "situations": [ { "id": "...", "name": "...", "description": "...",
//!                         "example": "...", "typical_triggers": [...] } ] }
//!   ]
//! }
//! ```
//! The file is read once into an immutable index owned by the catalog value.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use dyad_core::repository::catalog::CatalogRepository;
use dyad_types::character::{CharacterProfile, ScenarioSituation, TestCase};
use dyad_types::error::RepositoryError;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    character_profiles: Vec<CharacterProfile>,
    #[serde(default)]
    conflict_scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
struct ScenarioEntry {
    id: String,
    #[serde(default)]
    situations: Vec<SituationEntry>,
}

#[derive(Debug, Deserialize)]
struct SituationEntry {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    example: String,
    #[serde(default)]
    typical_triggers: Vec<String>,
}

/// In-memory catalog loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    characters: Vec<CharacterProfile>,
    /// Situations in file order.
    situations: Vec<ScenarioSituation>,
    character_index: HashMap<String, usize>,
    situation_index: HashMap<(String, String), usize>,
}

impl JsonCatalog {
    /// Read and index a catalog file.
    pub async fn load(path: &Path) -> Result<Self, RepositoryError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RepositoryError::Io(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            characters = catalog.characters.len(),
            situations = catalog.situations.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    /// Index catalog JSON text.
    pub fn from_json(content: &str) -> Result<Self, RepositoryError> {
        let file: CatalogFile = serde_json::from_str(content).map_err(|e| RepositoryError::Parse(e.to_string()))?;

        let situations: Vec<ScenarioSituation> = file
            .conflict_scenarios
            .into_iter()
            .flat_map(|scenario| {
                let scenario_id = scenario.id;
                scenario.situations.into_iter().map(move |s| ScenarioSituation {
                    scenario_id: scenario_id.clone(),
                    situation_id: s.id,
                    name: s.name,
                    description: s.description,
                    example: s.example,
                    typical_triggers: s.typical_triggers,
                })
            })
            .collect();

        let mut character_index = HashMap::new();
        for (i, character) in file.character_profiles.iter().enumerate() {
            if character_index.insert(character.id.clone(), i).is_some() {
                return Err(RepositoryError::Parse(format!("duplicate character id '{}'", character.id)));
            }
        }
        let mut situation_index = HashMap::new();
        for (i, s) in situations.iter().enumerate() {
            if situation_index
                .insert((s.scenario_id.clone(), s.situation_id.clone()), i)
                .is_some()
            {
                return Err(RepositoryError::Parse(format!(
                    "duplicate situation '{}/{}'",
                    s.scenario_id, s.situation_id
                )));
            }
        }

        Ok(Self {
            characters: file.character_profiles,
            situations,
            character_index,
            situation_index,
        })
    }

    pub fn characters(&self) -> &[CharacterProfile] {
        &self.characters
    }

    pub fn situations(&self) -> &[ScenarioSituation] {
        &self.situations
    }

    fn character(&self, id: &str) -> Option<&CharacterProfile> {
        self.character_index.get(id).map(|&i| &self.characters[i])
    }

    fn situation(&self, scenario_id: &str, situation_id: &str) -> Option<&ScenarioSituation> {
        self.situation_index
            .get(&(scenario_id.to_string(), situation_id.to_string()))
            .map(|&i| &self.situations[i])
    }

    /// Test cases for one character.
    ///
    /// A character pinned to a scenario and situation yields that single
    /// pair; one pinned only to a scenario runs every situation of it; an
    /// unpinned character runs every situation in the catalog.
    fn cases_for(&self, character: &CharacterProfile) -> Vec<TestCase> {
        let case = |s: &ScenarioSituation| TestCase {
            character_id: character.id.clone(),
            scenario_id: s.scenario_id.clone(),
            situation_id: s.situation_id.clone(),
        };
        match (&character.scenario_id, &character.situation_id) {
            (Some(scenario), Some(situation)) => match self.situation(scenario, situation) {
                Some(s) => vec![case(s)],
                None => {
                    tracing::warn!(
                        character = %character.id,
                        scenario = %scenario,
                        situation = %situation,
                        "Character references an unknown situation, skipping"
                    );
                    Vec::new()
                }
            },
            (Some(scenario), None) => self
                .situations
                .iter()
                .filter(|s| &s.scenario_id == scenario)
                .map(case)
                .collect(),
            _ => self.situations.iter().map(case).collect(),
        }
    }
}

impl CatalogRepository for JsonCatalog {
    async fn resolve_character(&self, character_id: &str) -> Result<CharacterProfile, RepositoryError> {
        self.character(character_id)
            .cloned()
            .ok_or_else(|| RepositoryError::character_not_found(character_id))
    }

    async fn resolve_situation(
        &self,
        scenario_id: &str,
        situation_id: &str,
    ) -> Result<ScenarioSituation, RepositoryError> {
        self.situation(scenario_id, situation_id)
            .cloned()
            .ok_or_else(|| RepositoryError::situation_not_found(scenario_id, situation_id))
    }

    async fn list_test_cases(&self) -> Result<Vec<TestCase>, RepositoryError> {
        Ok(self.characters.iter().flat_map(|c| self.cases_for(c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG: &str = r#"{
        "character_profiles": [
            {"id": "anxious_01", "name": "Lin", "age": 27, "gender": "female",
             "personality_type": "neuroticism_high", "attachment_style": "anxious",
             "scenario_id": "communication", "situation_id": "ignored_messages"},
            {"id": "calm_02", "name": "Zhou", "scenario_id": "finance"},
            {"id": "open_03", "name": "Wu"}
        ],
        "conflict_scenarios": [
            {"id": "communication", "name": "Communication", "description": "Talking past each other",
             "situations": [
                {"id": "ignored_messages", "name": "Ignored messages", "description": "Left on read",
                 "example": "No reply all afternoon", "typical_triggers": ["read receipts"]},
                {"id": "interrupting", "name": "Interrupting"}
             ]},
            {"id": "finance", "name": "Money", "situations": [
                {"id": "big_purchase", "name": "Big purchase"}
            ]}
        ]
    }"#;

    #[tokio::test]
    async fn resolve_character_and_situation() {
        let catalog = JsonCatalog::from_json(CATALOG).unwrap();
        let lin = catalog.resolve_character("anxious_01").await.unwrap();
        assert_eq!(lin.name, "Lin");
        assert_eq!(lin.personality_tag, "neuroticism_high");
        assert_eq!(lin.attachment_tag, "anxious");

        let situation = catalog
            .resolve_situation("communication", "ignored_messages")
            .await
            .unwrap();
        assert_eq!(situation.name, "Ignored messages");
        assert_eq!(situation.typical_triggers, vec!["read receipts"]);
    }

    #[tokio::test]
    async fn missing_entries_are_not_found() {
        let catalog = JsonCatalog::from_json(CATALOG).unwrap();
        let err = catalog.resolve_character("ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "character 'ghost' not found");
        let err = catalog.resolve_situation("finance", "ignored_messages").await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { kind: "situation", .. }));
    }

    #[tokio::test]
    async fn test_cases_follow_character_pins() {
        let catalog = JsonCatalog::from_json(CATALOG).unwrap();
        let cases = catalog.list_test_cases().await.unwrap();
        let pairs: Vec<(&str, &str)> = cases
            .iter()
            .map(|c| (c.character_id.as_str(), c.situation_id.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("anxious_01", "ignored_messages"),
                ("calm_02", "big_purchase"),
                ("open_03", "ignored_messages"),
                ("open_03", "interrupting"),
                ("open_03", "big_purchase"),
            ]
        );
    }

    #[test]
    fn duplicate_character_is_rejected() {
        let json = r#"{"character_profiles": [{"id": "a", "name": "A"}, {"id": "a", "name": "B"}]}"#;
        assert!(matches!(JsonCatalog::from_json(json), Err(RepositoryError::Parse(_))));
    }

    #[tokio::test]
    async fn load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        tokio::fs::write(&path, CATALOG).await.unwrap();
        let catalog = JsonCatalog::load(&path).await.unwrap();
        assert_eq!(catalog.characters().len(), 3);
        assert_eq!(catalog.situations().len(), 3);
    }

    #[tokio::test]
    async fn load_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = JsonCatalog::load(&tmp.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Io(_)));
    }
}
