//! Pipeline configuration: a layered, env-overridable settings struct plus a
//! DB-backed `app_config` key/value cache (spec §6.4), following the
//! "globals become explicit state" guidance in spec §9.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::FatalConfigError;

/// Static settings read once at process start, layered file-then-env,
/// mirroring `CliConfig::load()`'s pattern.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSettings {
    pub database_url: String,
    pub llm_base_url: String,
    pub llm_api_key_env: String,
    pub llm_model: String,
    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u64,
    #[serde(default = "default_max_scoring_job_ms")]
    pub max_scoring_job_ms: u64,
    #[serde(default = "default_llm_call_timeout_seconds")]
    pub llm_call_timeout_seconds: u64,
}

fn default_tick_interval_seconds() -> u64 {
    300
}
fn default_max_scoring_job_ms() -> u64 {
    10 * 60 * 1000
}
fn default_llm_call_timeout_seconds() -> u64 {
    30
}

impl PipelineSettings {
    /// Load from `config/pipeline.yaml` (if present), then environment
    /// variables prefixed `LOGRISK_` override any field.
    pub fn load() -> Result<Self, FatalConfigError> {
        let mut builder = config::Config::builder();

        let config_path = std::env::var("LOGRISK_CONFIG_FILE")
            .unwrap_or_else(|_| "config/pipeline.yaml".to_string());
        if std::path::Path::new(&config_path).exists() {
            builder = builder.add_source(config::File::with_name(&config_path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("LOGRISK")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| FatalConfigError::Invalid(e.to_string()))?;

        let settings: PipelineSettings = raw
            .try_deserialize()
            .map_err(|e| FatalConfigError::Missing(e.to_string()))?;

        if settings.database_url.is_empty() {
            return Err(FatalConfigError::Missing("database_url".to_string()));
        }
        if settings.llm_base_url.is_empty() {
            return Err(FatalConfigError::Missing("llm_base_url".to_string()));
        }

        Ok(settings)
    }

    pub fn llm_call_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_call_timeout_seconds)
    }

    pub fn max_scoring_job_duration(&self) -> Duration {
        Duration::from_millis(self.max_scoring_job_ms)
    }
}

/// Tunable pipeline knobs, normally backed by the `app_config(key, value)`
/// table. Values here are the hard-coded defaults used when a key is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    pub w_meta: f64,
    pub window_minutes: i64,
    pub scoring_chunk_size: i64,
    pub scoring_batch_size: i64,
    pub message_max_length: usize,
    pub score_cache_ttl_minutes: i64,
    pub low_score_min_scorings: i64,
    pub low_score_threshold: f64,
    pub severity_skip_enabled: bool,
    pub severity_skip_set: Vec<String>,
    pub severity_skip_default_value: f64,
    pub meta_context_summaries: usize,
    pub skip_zero_score_meta: bool,
    pub filter_zero_score_meta_events: bool,
    pub max_new_findings_per_window: usize,
    pub max_open_findings_per_system: usize,
    pub auto_resolve_after_misses: i32,
    pub severity_decay_after_occurrences: i64,
    pub severity_decay_enabled: bool,
    pub finding_dedup_fuzzy_enabled: bool,
    pub finding_dedup_threshold: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            w_meta: 0.7,
            window_minutes: 5,
            scoring_chunk_size: 5000,
            scoring_batch_size: 20,
            message_max_length: 512,
            score_cache_ttl_minutes: 60,
            low_score_min_scorings: 5,
            low_score_threshold: 0.1,
            severity_skip_enabled: true,
            severity_skip_set: vec!["debug".to_string()],
            severity_skip_default_value: 0.0,
            meta_context_summaries: 5,
            skip_zero_score_meta: true,
            filter_zero_score_meta_events: false,
            max_new_findings_per_window: 5,
            max_open_findings_per_system: 25,
            auto_resolve_after_misses: 5,
            severity_decay_after_occurrences: 10,
            severity_decay_enabled: true,
            finding_dedup_fuzzy_enabled: false,
            finding_dedup_threshold: 0.6,
        }
    }
}

/// In-process cache over the `app_config` table: explicit state with a TTL,
/// invalidated on write, rather than a module-level singleton (spec §9).
pub struct AppConfigCache {
    inner: RwLock<CacheInner>,
    ttl: Duration,
}

struct CacheInner {
    values: HashMap<String, serde_json::Value>,
    loaded_at: Option<DateTime<Utc>>,
}

impl AppConfigCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                values: HashMap::new(),
                loaded_at: None,
            }),
            ttl,
        }
    }

    pub fn is_stale(&self) -> bool {
        let inner = self.inner.read().unwrap();
        match inner.loaded_at {
            None => true,
            Some(loaded_at) => {
                let elapsed = Utc::now().signed_duration_since(loaded_at);
                elapsed.to_std().unwrap_or(Duration::MAX) >= self.ttl
            }
        }
    }

    pub fn replace(&self, values: HashMap<String, serde_json::Value>) {
        let mut inner = self.inner.write().unwrap();
        inner.values = values;
        inner.loaded_at = Some(Utc::now());
    }

    pub fn invalidate(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.loaded_at = None;
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().unwrap().values.get(key).cloned()
    }

    /// Build a [`TuningConfig`], overlaying any cached keys onto the defaults.
    pub fn tuning_config(&self) -> TuningConfig {
        let mut cfg = TuningConfig::default();
        let inner = self.inner.read().unwrap();

        macro_rules! overlay_f64 {
            ($key:literal, $field:ident) => {
                if let Some(v) = inner.values.get($key).and_then(|v| v.as_f64()) {
                    cfg.$field = v;
                }
            };
        }
        macro_rules! overlay_i64 {
            ($key:literal, $field:ident) => {
                if let Some(v) = inner.values.get($key).and_then(|v| v.as_i64()) {
                    cfg.$field = v;
                }
            };
        }
        macro_rules! overlay_bool {
            ($key:literal, $field:ident) => {
                if let Some(v) = inner.values.get($key).and_then(|v| v.as_bool()) {
                    cfg.$field = v;
                }
            };
        }

        overlay_f64!("w_meta", w_meta);
        overlay_i64!("window_minutes", window_minutes);
        overlay_i64!("scoring_chunk_size", scoring_chunk_size);
        overlay_i64!("scoring_batch_size", scoring_batch_size);
        overlay_i64!("score_cache_ttl_minutes", score_cache_ttl_minutes);
        overlay_i64!("low_score_min_scorings", low_score_min_scorings);
        overlay_f64!("low_score_threshold", low_score_threshold);
        overlay_bool!("severity_skip_enabled", severity_skip_enabled);
        overlay_bool!("skip_zero_score_meta", skip_zero_score_meta);
        overlay_bool!(
            "filter_zero_score_meta_events",
            filter_zero_score_meta_events
        );
        if let Some(v) = inner
            .values
            .get("auto_resolve_after_misses")
            .and_then(|v| v.as_i64())
        {
            cfg.auto_resolve_after_misses = v as i32;
        }
        overlay_i64!(
            "severity_decay_after_occurrences",
            severity_decay_after_occurrences
        );
        overlay_bool!("severity_decay_enabled", severity_decay_enabled);
        overlay_bool!("finding_dedup_fuzzy_enabled", finding_dedup_fuzzy_enabled);
        overlay_f64!("finding_dedup_threshold", finding_dedup_threshold);

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cache_is_stale_until_loaded() {
        let cache = AppConfigCache::new(Duration::from_secs(60));
        assert!(cache.is_stale());
        cache.replace(HashMap::new());
        assert!(!cache.is_stale());
    }

    #[test]
    fn invalidate_forces_reload() {
        let cache = AppConfigCache::new(Duration::from_secs(60));
        cache.replace(HashMap::new());
        assert!(!cache.is_stale());
        cache.invalidate();
        assert!(cache.is_stale());
    }

    #[test]
    fn tuning_overlay_falls_back_to_defaults() {
        let cache = AppConfigCache::new(Duration::from_secs(60));
        let mut values = HashMap::new();
        values.insert("w_meta".to_string(), serde_json::json!(0.5));
        cache.replace(values);

        let cfg = cache.tuning_config();
        assert_eq!(cfg.w_meta, 0.5);
        assert_eq!(cfg.window_minutes, 5); // untouched default
    }
}
