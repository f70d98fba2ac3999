//! Persistent, deduplicated, decaying finding entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl FindingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FindingStatus::Resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// One rank down, for severity decay (critical -> high -> medium -> low -> info).
    /// `info` is the floor and does not decay further.
    pub fn decay_one_rank(self) -> Severity {
        match self {
            Severity::Critical => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium => Severity::Low,
            Severity::Low => Severity::Info,
            Severity::Info => Severity::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str_default_medium(s: &str) -> Severity {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" => Severity::Info,
            _ => Severity::Medium,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResolutionReason {
    LlmResolved { resolved_by_meta_id: Uuid },
    AutoResolvedStale,
    AutoClosedOverCapacity,
}

/// A persistent issue entity with lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub system_id: Uuid,
    pub status: FindingStatus,
    pub severity: Severity,
    /// Severity at creation time, before any decay has been applied.
    pub original_severity: Severity,
    pub criterion_slug: Option<String>,
    pub text: String,
    pub fingerprint: String,
    pub occurrence_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub consecutive_misses: i32,
    pub created_by_meta_id: Uuid,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by_meta_id: Option<Uuid>,
    pub resolution_note: Option<String>,
}

impl Finding {
    pub fn new(
        system_id: Uuid,
        text: String,
        severity: Severity,
        criterion_slug: Option<String>,
        fingerprint: String,
        created_by_meta_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            system_id,
            status: FindingStatus::Open,
            severity,
            original_severity: severity,
            criterion_slug,
            text,
            fingerprint,
            occurrence_count: 1,
            created_at: now,
            last_seen_at: now,
            consecutive_misses: 0,
            created_by_meta_id,
            resolved_at: None,
            resolved_by_meta_id: None,
            resolution_note: None,
        }
    }

    pub fn resolve(&mut self, now: DateTime<Utc>, reason: ResolutionReason) {
        if self.status.is_terminal() {
            return;
        }
        self.status = FindingStatus::Resolved;
        self.resolved_at = Some(now);
        match reason {
            ResolutionReason::LlmResolved { resolved_by_meta_id } => {
                self.resolved_by_meta_id = Some(resolved_by_meta_id);
                self.resolution_note = Some("resolved_by_meta_analysis".to_string());
            }
            ResolutionReason::AutoResolvedStale => {
                self.resolution_note = Some("auto_resolved_stale".to_string());
            }
            ResolutionReason::AutoClosedOverCapacity => {
                self.resolution_note = Some("auto_closed_over_capacity".to_string());
            }
        }
    }

    pub fn reoccur(&mut self, now: DateTime<Utc>) {
        self.occurrence_count += 1;
        self.last_seen_at = now;
        self.consecutive_misses = 0;
    }

    pub fn maybe_decay(&mut self, decay_after_occurrences: i64, enabled: bool) {
        if enabled && self.occurrence_count >= decay_after_occurrences {
            self.severity = self.severity.decay_one_rank();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_is_terminal_and_cannot_reopen() {
        let mut f = Finding::new(
            Uuid::new_v4(),
            "x".into(),
            Severity::High,
            None,
            "fp".into(),
            Uuid::new_v4(),
            Utc::now(),
        );
        let created_at = f.created_at;
        f.resolve(Utc::now(), ResolutionReason::AutoResolvedStale);
        assert!(f.status.is_terminal());
        assert!(f.resolved_at.unwrap() >= created_at);

        // Attempting to resolve again is a no-op; status remains resolved.
        let resolved_at_first = f.resolved_at;
        f.resolve(Utc::now(), ResolutionReason::AutoClosedOverCapacity);
        assert_eq!(f.resolved_at, resolved_at_first);
    }

    #[test]
    fn severity_decays_one_rank_at_a_time() {
        assert_eq!(Severity::Critical.decay_one_rank(), Severity::High);
        assert_eq!(Severity::Low.decay_one_rank(), Severity::Info);
        assert_eq!(Severity::Info.decay_one_rank(), Severity::Info);
    }
}
