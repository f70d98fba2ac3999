//! logrisk-pipeline
//!
//! Periodic log-risk analysis pipeline: heterogeneous log ingestion,
//! message-template dedup, LLM-scored per-event criteria, windowed
//! meta-analysis with a sliding context, a persistent finding lifecycle,
//! effective-score blending, and rule-driven alert evaluation.
//!
//! The orchestrator (see [`orchestrator::Orchestrator`]) ties every
//! component together and is the only public entrypoint that drives a full
//! pipeline tick; everything else here is usable standalone for testing or
//! for embedding in a different scheduler.

pub mod alerts;
pub mod blending;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod findings;
pub mod health;
pub mod ingest;
pub mod llm;
pub mod meta;
pub mod metrics;
pub mod orchestrator;
pub mod repository;
pub mod scoring;
pub mod template;
pub mod windowing;

pub use config::{PipelineSettings, TuningConfig};
pub use db::Database;
pub use error::PipelineError;
pub use orchestrator::Orchestrator;
pub use repository::Repositories;
