//! Blended per-window, per-criterion dashboard scores.

use uuid::Uuid;

use super::criterion::Criterion;

/// The dashboard read model: one row per (window, system, criterion).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveScore {
    pub window_id: Uuid,
    pub system_id: Uuid,
    pub criterion: Criterion,
    pub effective_value: f64,
    pub meta_score: f64,
    pub max_event_score: f64,
}
