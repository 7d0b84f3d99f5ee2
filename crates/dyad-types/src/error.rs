use thiserror::Error;

pub use crate::llm::LlmError;

/// Errors from the scenario/character repository and session logs.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("io error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl RepositoryError {
    pub fn character_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "character",
            id: id.into(),
        }
    }

    pub fn situation_not_found(scenario_id: &str, situation_id: &str) -> Self {
        Self::NotFound {
            kind: "situation",
            id: format!("{scenario_id}/{situation_id}"),
        }
    }
}

/// Errors raised while loading or validating a simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {message}")]
    Read { path: String, message: String },

    #[error("invalid config file '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("unknown provider '{name}' referenced by {referenced_by}")]
    UnknownProvider { name: String, referenced_by: String },

    #[error("no providers configured for role '{0}'")]
    EmptyRole(String),

    #[error("API key environment variable '{0}' is not set")]
    MissingApiKey(String),
}

/// Errors surfaced by a dialogue session.
///
/// Only `Configuration` and `NotFound` escape `start`; the others are
/// reported from `advance` and folded into a termination reason by
/// `run_to_completion`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("not found: {0}")]
    NotFound(#[from] RepositoryError),

    #[error("backend failure: {0}")]
    Gateway(#[from] LlmError),

    #[error("session already terminated")]
    AlreadyTerminated,

    #[error("session log error: {0}")]
    Log(String),
}

/// A model reply could not be decoded into the expected structure.
///
/// Recovered locally by the lenient extraction step; never propagated out
/// of the consensus or prediction parsers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("reply contains no JSON object")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = RepositoryError::situation_not_found("s1", "s1_2");
        assert_eq!(err.to_string(), "situation 's1/s1_2' not found");
    }

    #[test]
    fn test_session_error_from_gateway() {
        let err: SessionError = LlmError::AuthenticationFailed.into();
        assert!(matches!(err, SessionError::Gateway(LlmError::AuthenticationFailed)));
    }
}
