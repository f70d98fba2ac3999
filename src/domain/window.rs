//! Fixed-width, closed-open time windows — the unit of meta-analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowTrigger {
    Time,
    EventCount,
}

/// A closed-open interval `[from_ts, to_ts)` scoped to one system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub id: Uuid,
    pub system_id: Uuid,
    pub from_ts: DateTime<Utc>,
    pub to_ts: DateTime<Utc>,
    pub trigger: WindowTrigger,
}

impl Window {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from_ts && ts < self.to_ts
    }
}
