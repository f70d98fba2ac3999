//! Ambient, lightweight instrumentation (SPEC_FULL §3 "Metrics counters"):
//! one atomic counter per notable pipeline event, in the same
//! atomic-struct-plus-snapshot shape as the teacher's
//! `pipeline::ingestion::IngestionMetrics`. No exporter, no histograms —
//! just counts a health endpoint or log line can report.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters for every pipeline component. Cheap to share:
/// construct once behind an `Arc` and clone the `Arc`, never the struct.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    events_ingested: AtomicU64,
    events_dropped: AtomicU64,
    templates_created: AtomicU64,
    llm_calls_made: AtomicU64,
    llm_calls_failed: AtomicU64,
    findings_opened: AtomicU64,
    findings_resolved: AtomicU64,
    alerts_fired: AtomicU64,
    alerts_resolved: AtomicU64,
    windows_analyzed: AtomicU64,
    scoring_runs: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_events_ingested(&self, n: u64) {
        self.events_ingested.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_events_dropped(&self, n: u64) {
        self.events_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_template_created(&self) {
        self.templates_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_call(&self, success: bool) {
        self.llm_calls_made.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.llm_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_finding_opened(&self) {
        self.findings_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finding_resolved(&self) {
        self.findings_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_fired(&self) {
        self.alerts_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_resolved(&self) {
        self.alerts_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_analyzed(&self) {
        self.windows_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scoring_run(&self) {
        self.scoring_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            templates_created: self.templates_created.load(Ordering::Relaxed),
            llm_calls_made: self.llm_calls_made.load(Ordering::Relaxed),
            llm_calls_failed: self.llm_calls_failed.load(Ordering::Relaxed),
            findings_opened: self.findings_opened.load(Ordering::Relaxed),
            findings_resolved: self.findings_resolved.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            alerts_resolved: self.alerts_resolved.load(Ordering::Relaxed),
            windows_analyzed: self.windows_analyzed.load(Ordering::Relaxed),
            scoring_runs: self.scoring_runs.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time read of [`PipelineMetrics`], cheap to serialize into a
/// health response or log line.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PipelineMetricsSnapshot {
    pub events_ingested: u64,
    pub events_dropped: u64,
    pub templates_created: u64,
    pub llm_calls_made: u64,
    pub llm_calls_failed: u64,
    pub findings_opened: u64,
    pub findings_resolved: u64,
    pub alerts_fired: u64,
    pub alerts_resolved: u64,
    pub windows_analyzed: u64,
    pub scoring_runs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = PipelineMetrics::new();
        metrics.record_events_ingested(10);
        metrics.record_llm_call(true);
        metrics.record_llm_call(false);
        metrics.record_finding_opened();

        let snap = metrics.snapshot();
        assert_eq!(snap.events_ingested, 10);
        assert_eq!(snap.llm_calls_made, 2);
        assert_eq!(snap.llm_calls_failed, 1);
        assert_eq!(snap.findings_opened, 1);
        assert_eq!(snap.alerts_fired, 0);
    }
}
