//! Audit row recorded for every LLM oracle call.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    Scoring,
    Meta,
}

impl RunType {
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Scoring => "scoring",
            RunType::Meta => "meta",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmUsage {
    pub id: Uuid,
    pub run_type: RunType,
    pub model: String,
    pub system_id: Uuid,
    pub window_id: Option<Uuid>,
    pub event_count: i64,
    pub token_input: i64,
    pub token_output: i64,
    pub request_count: i64,
    pub cost_estimate: f64,
    pub created_at: DateTime<Utc>,
}
