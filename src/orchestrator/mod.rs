//! Orchestrator (spec §4.9): runs `scoring -> windowing -> meta per window ->
//! alerts per successful window` on a periodic schedule, at most once at a
//! time, re-reading configuration at the start of every run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::alerts::AlertEvaluator;
use crate::config::{AppConfigCache, PipelineSettings};
use crate::domain::MonitoredSystem;
use crate::findings::FindingEngine;
use crate::health::PipelineHealth;
use crate::meta::MetaAnalyser;
use crate::metrics::PipelineMetrics;
use crate::repository::Repositories;
use crate::scoring::EventScorer;
use crate::windowing::Windower;

pub struct Orchestrator {
    repos: Repositories,
    scorer: Arc<EventScorer>,
    windower: Arc<Windower>,
    meta_analyser: Arc<MetaAnalyser>,
    finding_engine: Arc<FindingEngine>,
    alert_evaluator: Arc<AlertEvaluator>,
    config_cache: Arc<AppConfigCache>,
    settings: PipelineSettings,
    health: Arc<PipelineHealth>,
    metrics: Arc<PipelineMetrics>,
    running: Mutex<()>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: Repositories,
        scorer: Arc<EventScorer>,
        windower: Arc<Windower>,
        meta_analyser: Arc<MetaAnalyser>,
        finding_engine: Arc<FindingEngine>,
        alert_evaluator: Arc<AlertEvaluator>,
        config_cache: Arc<AppConfigCache>,
        settings: PipelineSettings,
        health: Arc<PipelineHealth>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            repos,
            scorer,
            windower,
            meta_analyser,
            finding_engine,
            alert_evaluator,
            config_cache,
            settings,
            health,
            metrics,
            running: Mutex::new(()),
        }
    }

    /// Runs the scheduler loop on `tick_interval_seconds`, until `shutdown`
    /// reports `true`. One scheduler task, one mutex-guarded run at a time,
    /// per spec §9's re-architecture guidance for the source's ad-hoc
    /// interval-timer-plus-running-flag pattern.
    pub async fn run_scheduler(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.settings.tick_interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("orchestrator scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One orchestration pass. Skips entirely (logging) if a previous run is
    /// still in flight rather than queuing or overlapping.
    #[instrument(skip(self))]
    pub async fn run_once(&self) {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("skipping tick: a previous orchestrator run is still in progress");
            return;
        };

        let now = Utc::now();

        if self.config_cache.is_stale() {
            match self.repos.app_config.load_all().await {
                Ok(values) => self.config_cache.replace(values),
                Err(e) => warn!(error = %e, "failed to refresh app_config cache, using stale/default values"),
            }
        }
        let tuning = self.config_cache.tuning_config();

        let systems = match self.repos.systems.list_active().await {
            Ok(systems) => systems,
            Err(e) => {
                warn!(error = %e, "failed to list active systems; aborting this tick");
                self.health.record_run_failure(e.to_string());
                return;
            }
        };

        self.run_scoring(&systems, &tuning).await;
        self.run_windowing_and_downstream(&systems, &tuning, now).await;

        self.health.record_run_success(now);
    }

    async fn run_scoring(&self, systems: &[MonitoredSystem], tuning: &crate::config::TuningConfig) {
        let started = Instant::now();
        match self
            .scorer
            .run(systems, tuning, started, self.settings.max_scoring_job_duration())
            .await
        {
            Ok(processed) => {
                self.metrics.record_scoring_run();
                info!(processed, "scoring pass complete");
            }
            Err(e) => {
                warn!(error = %e, "scoring pass ended early or failed");
            }
        }
    }

    async fn run_windowing_and_downstream(
        &self,
        systems: &[MonitoredSystem],
        tuning: &crate::config::TuningConfig,
        now: chrono::DateTime<Utc>,
    ) {
        let by_id: HashMap<Uuid, &MonitoredSystem> = systems.iter().map(|s| (s.id, s)).collect();
        let window_results = self.windower.run(systems, tuning.window_minutes, now).await;

        for (system_id, result) in window_results {
            let mut windows = match result {
                Ok(windows) => windows,
                Err(e) => {
                    warn!(system_id = %system_id, error = %e, "windowing failed for system");
                    continue;
                }
            };
            let Some(system) = by_id.get(&system_id) else { continue };

            // Re-offer windows a prior tick left without a meta-result (a
            // transient LLM/repository error, not a parse failure) so they
            // get retried instead of being silently skipped forever once the
            // windower has moved past them (spec §7 TransientIO).
            match self.repos.windows.pending_without_meta(system_id).await {
                Ok(pending) => {
                    let already_queued: std::collections::HashSet<Uuid> =
                        windows.iter().map(|w| w.id).collect();
                    windows.extend(pending.into_iter().filter(|w| !already_queued.contains(&w.id)));
                }
                Err(e) => {
                    warn!(system_id = %system_id, error = %e, "failed to list windows pending meta-analysis");
                }
            }

            for window in windows {
                self.process_window(system, &window, tuning).await;
            }
        }
    }

    /// Meta-analysis, finding lifecycle, and alert evaluation for one
    /// window. A failure at any stage is logged and isolated: it never
    /// aborts the rest of the run, and alerts only ever evaluate for a
    /// window whose meta-analysis actually succeeded.
    async fn process_window(
        &self,
        system: &MonitoredSystem,
        window: &crate::domain::Window,
        tuning: &crate::config::TuningConfig,
    ) {
        match self.repos.windows.has_meta_result(window.id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(window_id = %window.id, error = %e, "failed to check window meta status");
                return;
            }
        }

        let outcome = match self.meta_analyser.analyze_window(system, window, tuning).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(window_id = %window.id, error = %e, "meta-analysis failed; skipping findings and alerts for this window");
                return;
            }
        };
        self.metrics.record_window_analyzed();

        if let Err(e) = self.finding_engine.process_window(&outcome, tuning).await {
            warn!(window_id = %window.id, error = %e, "finding lifecycle processing failed");
        }

        if let Err(e) = self
            .alert_evaluator
            .evaluate_window(system.id, &system.name, &outcome.effective_scores)
            .await
        {
            warn!(window_id = %window.id, error = %e, "alert evaluation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn running_mutex_rejects_concurrent_try_lock() {
        let running = Mutex::new(());
        let _first = running.try_lock().expect("first lock succeeds");
        assert!(running.try_lock().is_err());
    }
}
