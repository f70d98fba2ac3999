//! Notification channels, rules, silences, and alert history.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{
    AlertHistory, AlertState, Criterion, NotificationChannel, NotificationRule, Silence,
    TriggerConfig,
};
use crate::error::RepositoryError;

#[derive(FromRow)]
struct ChannelRow {
    id: Uuid,
    name: String,
    kind: String,
    config: serde_json::Value,
    enabled: bool,
}

impl ChannelRow {
    fn into_domain(self) -> NotificationChannel {
        NotificationChannel {
            id: self.id,
            name: self.name,
            kind: self.kind,
            config: self.config,
            enabled: self.enabled,
        }
    }
}

#[derive(FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    enabled: bool,
    channel_id: Uuid,
    trigger_config: serde_json::Value,
    filters: serde_json::Value,
    throttle_interval_seconds: i64,
    send_recovery: bool,
    notify_only_on_state_change: bool,
}

impl RuleRow {
    fn into_domain(self) -> Result<NotificationRule, RepositoryError> {
        let trigger_config: TriggerConfig = serde_json::from_value(self.trigger_config)?;
        Ok(NotificationRule {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            channel_id: self.channel_id,
            trigger_config,
            filters: self.filters,
            throttle_interval_seconds: self.throttle_interval_seconds,
            send_recovery: self.send_recovery,
            notify_only_on_state_change: self.notify_only_on_state_change,
        })
    }
}

#[derive(FromRow)]
struct SilenceRow {
    id: Uuid,
    system_id: Option<Uuid>,
    criterion: Option<String>,
    rule_id: Option<Uuid>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    reason: String,
}

impl SilenceRow {
    fn into_domain(self) -> Silence {
        Silence {
            id: self.id,
            system_id: self.system_id,
            criterion: self.criterion.and_then(|c| Criterion::from_slug(&c)),
            rule_id: self.rule_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            reason: self.reason,
        }
    }
}

pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enabled_rules(&self) -> Result<Vec<NotificationRule>, RepositoryError> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT id, name, enabled, channel_id, trigger_config, filters, \
                    throttle_interval_seconds, send_recovery, notify_only_on_state_change \
             FROM notification_rules WHERE enabled = TRUE",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RuleRow::into_domain).collect()
    }

    pub async fn get_channel(
        &self,
        channel_id: Uuid,
    ) -> Result<Option<NotificationChannel>, RepositoryError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, name, kind, config, enabled FROM notification_channels WHERE id = $1",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ChannelRow::into_domain))
    }

    pub async fn active_silences(&self, now: DateTime<Utc>) -> Result<Vec<Silence>, RepositoryError> {
        let rows = sqlx::query_as::<_, SilenceRow>(
            "SELECT id, system_id, criterion, rule_id, starts_at, ends_at, reason \
             FROM silences WHERE starts_at <= $1 AND ends_at > $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SilenceRow::into_domain).collect())
    }

    /// Last recorded state for a `(rule, system, criterion)` triple, used by
    /// the alert evaluator's firing/resolved transition logic.
    pub async fn last_history(
        &self,
        rule_id: Uuid,
        system_id: Uuid,
        criterion: Criterion,
    ) -> Result<Option<AlertHistory>, RepositoryError> {
        #[derive(FromRow)]
        struct Row {
            id: Uuid,
            rule_id: Uuid,
            system_id: Uuid,
            criterion: String,
            state: String,
            triggering_value: f64,
            created_at: DateTime<Utc>,
            dispatched: bool,
            suppressed_by_silence: bool,
        }
        let row: Option<Row> = sqlx::query_as(
            "SELECT id, rule_id, system_id, criterion, state, triggering_value, \
                    created_at, dispatched, suppressed_by_silence \
             FROM alert_history \
             WHERE rule_id = $1 AND system_id = $2 AND criterion = $3 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(rule_id)
        .bind(system_id)
        .bind(criterion.slug())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AlertHistory {
            id: r.id,
            rule_id: r.rule_id,
            system_id: r.system_id,
            criterion,
            state: match r.state.as_str() {
                "resolved" => AlertState::Resolved,
                _ => AlertState::Firing,
            },
            triggering_value: r.triggering_value,
            created_at: r.created_at,
            dispatched: r.dispatched,
            suppressed_by_silence: r.suppressed_by_silence,
        }))
    }

    #[instrument(skip(self, entry))]
    pub async fn record_history(&self, entry: &AlertHistory) -> Result<(), RepositoryError> {
        let state_str = match entry.state {
            AlertState::Firing => "firing",
            AlertState::Resolved => "resolved",
        };
        sqlx::query(
            "INSERT INTO alert_history \
                (id, rule_id, system_id, criterion, state, triggering_value, \
                 created_at, dispatched, suppressed_by_silence) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.rule_id)
        .bind(entry.system_id)
        .bind(entry.criterion.slug())
        .bind(state_str)
        .bind(entry.triggering_value)
        .bind(entry.created_at)
        .bind(entry.dispatched)
        .bind(entry.suppressed_by_silence)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
