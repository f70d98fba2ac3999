//! Error taxonomy (spec §7). Every component returns its own typed error;
//! the orchestrator is the only place these are logged and swallowed rather
//! than propagated — per-unit failures never abort a pipeline run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("entry rejected: {0}")]
    InvalidEntry(String),
    #[error("timestamp unparseable, fell back to now: {0}")]
    TimestampUnparseable(String),
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no log source matched event")]
    NoMatch,
    #[error("invalid selector regex in source {source_id}: {message}")]
    InvalidSelector { source_id: String, message: String },
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM HTTP call failed: {0}")]
    Call(String),
    #[error("LLM response could not be parsed: {0}")]
    Parse(String),
    #[error("LLM call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("scoring job exceeded its soft deadline; {processed} events processed before returning partial progress")]
    DeadlineExceeded { processed: usize },
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("meta-analysis output failed to parse for window {window_id}: {message}")]
    Parse { window_id: String, message: String },
}

#[derive(Debug, Error)]
pub enum FindingError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
    #[error("channel dispatch failed: {0}")]
    Dispatch(String),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[derive(Debug, Error)]
pub enum FatalConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error the orchestrator logs per failed unit of work. Never
/// escapes the orchestrator's run loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error(transparent)]
    Finding(#[from] FindingError),
    #[error(transparent)]
    Alert(#[from] AlertError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
