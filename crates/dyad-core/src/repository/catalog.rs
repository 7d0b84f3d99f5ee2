//! Scenario/Character repository trait definition.

use dyad_types::character::{CharacterProfile, ScenarioSituation, TestCase};
use dyad_types::error::RepositoryError;

/// Read-only source of characters and conflict situations.
///
/// Injected into the engine at session start; implementations load their
/// data once and hold no process-wide state.
pub trait CatalogRepository: Send + Sync {
    /// Look up a character profile by id.
    fn resolve_character(
        &self,
        character_id: &str,
    ) -> impl std::future::Future<Output = Result<CharacterProfile, RepositoryError>> + Send;

    /// Look up one situation of a scenario.
    fn resolve_situation(
        &self,
        scenario_id: &str,
        situation_id: &str,
    ) -> impl std::future::Future<Output = Result<ScenarioSituation, RepositoryError>> + Send;

    /// Every runnable (character, situation) pair, for batch runs.
    fn list_test_cases(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<TestCase>, RepositoryError>> + Send;
}
