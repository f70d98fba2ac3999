//! Per-event, per-criterion score rows.

use super::criterion::Criterion;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreType {
    Event,
}

impl ScoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreType::Event => "event",
        }
    }
}

/// One non-zero score for one event and one criterion. Rows are only ever
/// written when `score > 0` (invariant I2); absence implies zero.
#[derive(Debug, Clone)]
pub struct EventScore {
    pub event_id: Uuid,
    pub criterion: Criterion,
    pub score_type: ScoreType,
    pub score: f64,
}
