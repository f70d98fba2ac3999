//! Notification channels, rules, silences, and the alert-history state trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::criterion::Criterion;

/// How a channel's secrets are resolved: `env:VAR_NAME` indirection only,
/// never stored plaintext (spec §6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    /// Channel-specific config; secret fields hold `env:VAR_NAME` references.
    pub config: serde_json::Value,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTriggerKind {
    Threshold,
    Schedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub kind: RuleTriggerKind,
    /// Required when `kind == Threshold`.
    pub criterion: Option<Criterion>,
    pub min_score: Option<f64>,
    /// Required when `kind == Schedule`: a standard 5-field cron expression.
    pub cron_expression: Option<String>,
    pub systems: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub channel_id: Uuid,
    pub trigger_config: TriggerConfig,
    pub filters: serde_json::Value,
    pub throttle_interval_seconds: i64,
    pub send_recovery: bool,
    pub notify_only_on_state_change: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silence {
    pub id: Uuid,
    pub system_id: Option<Uuid>,
    pub criterion: Option<Criterion>,
    pub rule_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: String,
}

impl Silence {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at && now < self.ends_at
    }

    pub fn matches(&self, system_id: Uuid, criterion: Criterion, rule_id: Uuid) -> bool {
        self.system_id.map(|s| s == system_id).unwrap_or(true)
            && self.criterion.map(|c| c == criterion).unwrap_or(true)
            && self.rule_id.map(|r| r == rule_id).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Firing,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistory {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub system_id: Uuid,
    pub criterion: Criterion,
    pub state: AlertState,
    pub triggering_value: f64,
    pub created_at: DateTime<Utc>,
    pub dispatched: bool,
    pub suppressed_by_silence: bool,
}
