//! Per-window meta-analysis output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::criterion::ScoreVector;
use super::finding::Severity as FindingSeverity;

/// A single structured finding as returned by the meta-analysis LLM call,
/// before it has been reconciled against the finding lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFinding {
    pub text: String,
    pub severity: FindingSeverity,
    pub criterion_slug: Option<String>,
}

/// The parsed, validated output of one meta-analysis LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaAnalysisResponse {
    pub meta_scores: ScoreVector,
    pub summary: String,
    pub new_findings: Vec<RawFinding>,
    /// 1-based indices into the open/acknowledged findings list supplied in the prompt.
    pub resolved_indices: Vec<usize>,
    pub recommended_action: Option<String>,
    pub key_event_ids: Vec<Uuid>,
}

/// The persisted row produced from a [`MetaAnalysisResponse`] for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaResult {
    pub id: Uuid,
    pub window_id: Uuid,
    pub system_id: Uuid,
    pub meta_scores: ScoreVector,
    pub summary: String,
    pub findings: Vec<RawFinding>,
    pub recommended_action: Option<String>,
    pub key_event_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}
