//! JSON session log writer and reader.
//!
//! One pretty-printed JSON document per finished session, named
//! `{character_id}_{situation_id}_{timestamp}_{short id}.json` so that
//! concurrent sessions of a batch never collide.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use dyad_core::repository::session_log::SessionLog;
use dyad_types::dialogue::SessionLogRecord;
use dyad_types::error::SessionError;

/// Writes session records into a directory.
#[derive(Debug, Clone)]
pub struct JsonSessionLog {
    dir: PathBuf,
}

impl JsonSessionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a record.
    ///
    /// The timestamp has microsecond precision and the UUID v7 suffix
    /// breaks ties between sessions finishing in the same instant.
    pub fn file_name(record: &SessionLogRecord) -> String {
        let id = Uuid::now_v7().simple().to_string();
        let short = &id[id.len() - 8..];
        format!(
            "{}_{}_{}_{}.json",
            sanitize(&record.result.character.id),
            sanitize(&record.result.scenario.situation_id),
            record.created_at.format("%Y%m%dT%H%M%S%.6f"),
            short
        )
    }

    /// Load a record back for replay.
    pub async fn read(path: &Path) -> Result<SessionLogRecord, SessionError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SessionError::Log(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| SessionError::Log(format!("failed to parse {}: {e}", path.display())))
    }
}

impl SessionLog for JsonSessionLog {
    async fn write(&self, record: &SessionLogRecord) -> Result<PathBuf, SessionError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SessionError::Log(format!("failed to create {}: {e}", self.dir.display())))?;

        let path = self.dir.join(Self::file_name(record));
        let json = serde_json::to_string_pretty(record).map_err(|e| SessionError::Log(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| SessionError::Log(format!("failed to write {}: {e}", path.display())))?;

        tracing::info!(path = %path.display(), "Session log written");
        Ok(path)
    }
}

/// Keep ids filesystem-safe.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dyad_types::character::{CharacterProfile, ScenarioSituation};
    use dyad_types::dialogue::{
        DialogueTurn, EndReason, SESSION_LOG_SCHEMA_VERSION, SessionPrompts, SessionResult, ValidationStatus,
    };
    use dyad_types::emotion::EmotionSnapshot;
    use tempfile::TempDir;

    fn record(character_id: &str) -> SessionLogRecord {
        let character = CharacterProfile {
            id: character_id.to_string(),
            name: "Lin".to_string(),
            age: 27,
            gender: "female".to_string(),
            personality_tag: String::new(),
            relationship_belief_tag: String::new(),
            communication_tag: String::new(),
            attachment_tag: String::new(),
            background: String::new(),
            trigger_topics: vec![],
            coping_mechanisms: vec![],
            scenario_id: None,
            situation_id: None,
        };
        let scenario = ScenarioSituation {
            scenario_id: "communication".to_string(),
            situation_id: "ignored_messages".to_string(),
            name: "Ignored messages".to_string(),
            description: String::new(),
            example: String::new(),
            typical_triggers: vec![],
        };
        let now = Utc::now();
        let result = SessionResult {
            character,
            scenario,
            turns: vec![],
            snapshots: vec![EmotionSnapshot::seed(-5, vec![])],
            final_score: -5,
            turns_completed: 0,
            termination_reason: EndReason::BackendFailure,
            consensus: vec![],
            predictions: vec![],
            started_at: now,
            finished_at: now,
        };
        SessionLogRecord::new(
            result,
            SessionPrompts {
                persona_system: "persona".into(),
                partner_system: "partner".into(),
            },
        )
    }

    #[test]
    fn file_name_embeds_ids_and_timestamp() {
        let record = record("anxious_01");
        let name = JsonSessionLog::file_name(&record);
        let stamp = record.created_at.format("%Y%m%dT%H%M%S").to_string();
        assert!(name.starts_with("anxious_01_ignored_messages_"));
        assert!(name.contains(&stamp));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn file_names_are_unique_for_same_record() {
        let record = record("anxious_01");
        assert_ne!(JsonSessionLog::file_name(&record), JsonSessionLog::file_name(&record));
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(sanitize("a/b c"), "a-b-c");
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let tmp = TempDir::new().unwrap();
        let log = JsonSessionLog::new(tmp.path().join("logs/nested"));
        let mut record = record("anxious_01");
        let payload = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "message": { "role": "assistant", "content": "你又到现在才回我。" } }],
        });
        record.result.turns.push(DialogueTurn {
            turn_number: 1,
            persona_utterance: "你又到现在才回我。".into(),
            persona_raw: "你又到现在才回我。".into(),
            persona_payload: payload.clone(),
            inner_monologue: String::new(),
            persona_validation: ValidationStatus::Passed,
            partner_utterance: Some("抱歉，我刚开完会。".into()),
            partner_validation: Some(ValidationStatus::Passed),
            partner_payload: Some(serde_json::json!({ "id": "chatcmpl-2" })),
            emotion_snapshot: EmotionSnapshot::seed(-5, vec![]),
            ended: false,
            end_reason: None,
        });
        let path = log.write(&record).await.unwrap();
        assert!(path.starts_with(log.dir()));

        let loaded = JsonSessionLog::read(&path).await.unwrap();
        assert_eq!(loaded.schema_version, SESSION_LOG_SCHEMA_VERSION);
        assert_eq!(loaded.result.character.id, "anxious_01");
        assert_eq!(loaded.result.termination_reason, EndReason::BackendFailure);
        assert_eq!(loaded.prompts.partner_system, "partner");
        let turn = &loaded.result.turns[0];
        assert_eq!(turn.persona_payload, payload);
        assert_eq!(turn.partner_payload, Some(serde_json::json!({ "id": "chatcmpl-2" })));
    }

    #[tokio::test]
    async fn read_missing_file_is_log_error() {
        let tmp = TempDir::new().unwrap();
        let err = JsonSessionLog::read(&tmp.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, SessionError::Log(_)));
    }
}
