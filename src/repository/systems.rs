//! Monitored systems and their log sources.

use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{EventSourceSelector, LogSource, MonitoredSystem, SelectorField};
use crate::error::RepositoryError;

#[derive(FromRow)]
struct SystemRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    retention_days: Option<i32>,
    timezone_offset_minutes: Option<i32>,
    event_source: String,
}

impl SystemRow {
    fn into_domain(self) -> MonitoredSystem {
        MonitoredSystem {
            id: self.id,
            name: self.name,
            description: self.description.unwrap_or_default(),
            retention_days: self.retention_days,
            timezone_offset_minutes: self.timezone_offset_minutes,
            event_source: match self.event_source.as_str() {
                "external_search_engine" => EventSourceSelector::ExternalSearchEngine,
                _ => EventSourceSelector::LocalStore,
            },
        }
    }
}

#[derive(FromRow)]
struct LogSourceRow {
    id: Uuid,
    system_id: Uuid,
    label: String,
    selector: serde_json::Value,
    priority: i32,
    active: bool,
}

impl LogSourceRow {
    fn into_domain(self) -> Result<LogSource, RepositoryError> {
        let raw: HashMap<String, String> = serde_json::from_value(self.selector)?;
        let selector = raw
            .into_iter()
            .filter_map(|(k, v)| SelectorField::from_str(&k).map(|field| (field, v)))
            .collect();
        Ok(LogSource {
            id: self.id,
            system_id: self.system_id,
            label: self.label,
            selector,
            priority: self.priority,
            active: self.active,
        })
    }
}

pub struct SystemRepository {
    pool: PgPool,
}

impl SystemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<MonitoredSystem>, RepositoryError> {
        let rows = sqlx::query_as::<_, SystemRow>(
            "SELECT id, name, description, retention_days, timezone_offset_minutes, event_source \
             FROM systems ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SystemRow::into_domain).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<MonitoredSystem>, RepositoryError> {
        let row = sqlx::query_as::<_, SystemRow>(
            "SELECT id, name, description, retention_days, timezone_offset_minutes, event_source \
             FROM systems WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SystemRow::into_domain))
    }

    /// Log sources for a system, lowest-priority-number first (invariant I1:
    /// the router picks the first selector match in this order).
    pub async fn log_sources_for_system(
        &self,
        system_id: Uuid,
    ) -> Result<Vec<LogSource>, RepositoryError> {
        let rows = sqlx::query_as::<_, LogSourceRow>(
            "SELECT id, system_id, label, selector, priority, active \
             FROM log_sources WHERE system_id = $1 AND active = TRUE ORDER BY priority ASC",
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogSourceRow::into_domain).collect()
    }

    pub async fn all_active_log_sources(&self) -> Result<Vec<LogSource>, RepositoryError> {
        let rows = sqlx::query_as::<_, LogSourceRow>(
            "SELECT id, system_id, label, selector, priority, active \
             FROM log_sources WHERE active = TRUE ORDER BY system_id, priority ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogSourceRow::into_domain).collect()
    }
}

impl SelectorField {
    fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }
}
