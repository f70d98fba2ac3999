//! Health check surface (SPEC_FULL §3): a point-in-time snapshot of
//! component liveness plus the last successful orchestrator run, analogous
//! to the teacher's `Database::health_check`. The HTTP endpoint that would
//! serve this is out of scope; this module only produces the snapshot.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::metrics::PipelineMetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Ok,
    Degraded,
    Down,
}

/// Tracks database connectivity and the timestamp of the last fully
/// successful orchestrator run, updated by the orchestrator after each tick.
pub struct PipelineHealth {
    database_ok: RwLock<bool>,
    last_successful_run: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self {
            database_ok: RwLock::new(true),
            last_successful_run: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    pub fn record_database_status(&self, ok: bool) {
        *self.database_ok.write() = ok;
    }

    pub fn record_run_success(&self, at: DateTime<Utc>) {
        *self.last_successful_run.write() = Some(at);
        *self.last_error.write() = None;
    }

    pub fn record_run_failure(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    pub fn snapshot(&self, metrics: PipelineMetricsSnapshot) -> HealthSnapshot {
        let database_ok = *self.database_ok.read();
        let last_successful_run = *self.last_successful_run.read();
        let last_error = self.last_error.read().clone();

        let status = if !database_ok {
            ComponentStatus::Down
        } else if last_error.is_some() {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Ok
        };

        HealthSnapshot {
            status,
            database_ok,
            last_successful_run,
            last_error,
            metrics,
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable health response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: ComponentStatus,
    pub database_ok: bool,
    pub last_successful_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub metrics: PipelineMetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PipelineMetrics;

    #[test]
    fn fresh_health_reports_ok_with_no_run_yet() {
        let health = PipelineHealth::new();
        let snap = health.snapshot(PipelineMetrics::new().snapshot());
        assert_eq!(snap.status, ComponentStatus::Ok);
        assert!(snap.last_successful_run.is_none());
    }

    #[test]
    fn database_down_overrides_to_down_status() {
        let health = PipelineHealth::new();
        health.record_database_status(false);
        let snap = health.snapshot(PipelineMetrics::new().snapshot());
        assert_eq!(snap.status, ComponentStatus::Down);
    }

    #[test]
    fn run_failure_without_db_outage_is_degraded() {
        let health = PipelineHealth::new();
        health.record_run_failure("meta parse error".to_string());
        let snap = health.snapshot(PipelineMetrics::new().snapshot());
        assert_eq!(snap.status, ComponentStatus::Degraded);
        assert_eq!(snap.last_error.as_deref(), Some("meta parse error"));
    }

    #[test]
    fn success_after_failure_clears_last_error() {
        let health = PipelineHealth::new();
        health.record_run_failure("boom".to_string());
        health.record_run_success(Utc::now());
        let snap = health.snapshot(PipelineMetrics::new().snapshot());
        assert_eq!(snap.status, ComponentStatus::Ok);
        assert!(snap.last_error.is_none());
    }
}
