//! Message templates: the canonicalised, deduplicated unit of LLM scoring work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::criterion::ScoreVector;

/// A canonicalised message pattern shared by one or more events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub system_id: Uuid,
    pub template_text: String,
    /// SHA-256 of the canonical form; unique per system.
    pub pattern_hash: String,
    pub occurrence_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_scored_at: Option<DateTime<Utc>>,
    pub cached_scores: Option<ScoreVector>,
    pub score_count: i64,
    pub avg_max_score: f64,
}

impl MessageTemplate {
    pub fn new(system_id: Uuid, template_text: String, pattern_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_id,
            template_text,
            pattern_hash,
            occurrence_count: 1,
            first_seen_at: now,
            last_seen_at: now,
            last_scored_at: None,
            cached_scores: None,
            score_count: 0,
            avg_max_score: 0.0,
        }
    }

    /// Folds a freshly observed max-criterion score into the running average,
    /// per spec §4.4 step 8: `(prev_avg * prev_count + new_max) / (prev_count + 1)`.
    pub fn fold_new_max_score(&mut self, max_score: f64) {
        let prev_count = self.score_count as f64;
        self.avg_max_score = (self.avg_max_score * prev_count + max_score) / (prev_count + 1.0);
        self.score_count += 1;
    }

    pub fn is_cache_fresh(&self, now: DateTime<Utc>, ttl_minutes: i64) -> bool {
        match (self.last_scored_at, &self.cached_scores) {
            (Some(scored_at), Some(_)) => {
                (now - scored_at).num_minutes() < ttl_minutes
            }
            _ => false,
        }
    }

    pub fn is_low_score_stable(&self, min_scorings: i64, threshold: f64) -> bool {
        self.score_count >= min_scorings && self.avg_max_score < threshold
    }
}

/// One distinct canonical pattern seen within an ingest/scoring batch.
#[derive(Debug, Clone)]
pub struct TemplateRepresentative {
    pub template_id: Uuid,
    pub system_id: Uuid,
    pub representative_event_id: Uuid,
    pub representative_message: String,
    pub event_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_new_max_score_averages_correctly() {
        let mut t = MessageTemplate::new(Uuid::new_v4(), "x".into(), "h".into(), Utc::now());
        t.fold_new_max_score(0.5);
        assert_eq!(t.score_count, 1);
        assert!((t.avg_max_score - 0.5).abs() < 1e-9);
        t.fold_new_max_score(1.0);
        assert_eq!(t.score_count, 2);
        assert!((t.avg_max_score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn cache_is_stale_without_scores() {
        let t = MessageTemplate::new(Uuid::new_v4(), "x".into(), "h".into(), Utc::now());
        assert!(!t.is_cache_fresh(Utc::now(), 30));
    }
}
