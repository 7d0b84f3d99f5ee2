//! Observability setup for dyad: tracing subscriber initialisation and
//! OpenTelemetry GenAI attribute names.

pub mod genai_attrs;
pub mod tracing_setup;
