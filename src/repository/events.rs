//! Event ingestion and retrieval.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{Event, EventSeverity};
use crate::error::RepositoryError;

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    system_id: Uuid,
    log_source_id: Option<Uuid>,
    timestamp: DateTime<Utc>,
    received_at: DateTime<Utc>,
    message: String,
    severity: String,
    host: Option<String>,
    source_ip: Option<String>,
    service: Option<String>,
    facility: Option<String>,
    program: Option<String>,
    trace_id: Option<String>,
    span_id: Option<String>,
    external_id: Option<String>,
    raw: serde_json::Value,
    normalized_hash: String,
    acknowledged_at: Option<DateTime<Utc>>,
    scored_at: Option<DateTime<Utc>>,
}

impl EventRow {
    fn into_domain(self) -> Event {
        Event {
            id: self.id,
            system_id: self.system_id,
            log_source_id: self.log_source_id,
            timestamp: self.timestamp,
            received_at: self.received_at,
            message: self.message,
            severity: EventSeverity::from_name(&self.severity).unwrap_or(EventSeverity::Info),
            host: self.host,
            source_ip: self.source_ip,
            service: self.service,
            facility: self.facility,
            program: self.program,
            trace_id: self.trace_id,
            span_id: self.span_id,
            external_id: self.external_id,
            raw: self.raw,
            normalized_hash: self.normalized_hash,
            acknowledged_at: self.acknowledged_at,
            scored_at: self.scored_at,
        }
    }
}

const EVENT_COLUMNS: &str = "id, system_id, log_source_id, timestamp, received_at, message, \
     severity, host, source_ip, service, facility, program, trace_id, span_id, external_id, \
     raw, normalized_hash, acknowledged_at, scored_at";

pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent bulk insert: duplicates by `(system_id, normalized_hash)` are
    /// silently dropped (invariant I1 dedup), returns the number of new rows.
    #[instrument(skip(self, events))]
    pub async fn insert_batch(&self, events: &[Event]) -> Result<u64, RepositoryError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for chunk in events.chunks(500) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                "INSERT INTO events (id, system_id, log_source_id, timestamp, received_at, \
                 message, severity, host, source_ip, service, facility, program, trace_id, \
                 span_id, external_id, raw, normalized_hash, acknowledged_at, scored_at) ",
            );
            builder.push_values(chunk, |mut b, event| {
                b.push_bind(event.id)
                    .push_bind(event.system_id)
                    .push_bind(event.log_source_id)
                    .push_bind(event.timestamp)
                    .push_bind(event.received_at)
                    .push_bind(&event.message)
                    .push_bind(event.severity.as_str())
                    .push_bind(&event.host)
                    .push_bind(&event.source_ip)
                    .push_bind(&event.service)
                    .push_bind(&event.facility)
                    .push_bind(&event.program)
                    .push_bind(&event.trace_id)
                    .push_bind(&event.span_id)
                    .push_bind(&event.external_id)
                    .push_bind(&event.raw)
                    .push_bind(&event.normalized_hash)
                    .push_bind(event.acknowledged_at)
                    .push_bind(event.scored_at);
            });
            builder.push(" ON CONFLICT (normalized_hash, timestamp) DO NOTHING");

            let result = builder.build().execute(&self.pool).await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Unscored events for a system, oldest first, capped at `limit` (the
    /// scorer paginates through this in `chunk_size` slices).
    #[instrument(skip(self))]
    pub async fn fetch_unscored(
        &self,
        system_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Event>, RepositoryError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE system_id = $1 AND scored_at IS NULL AND acknowledged_at IS NULL \
             ORDER BY timestamp ASC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(system_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(EventRow::into_domain).collect())
    }

    pub async fn fetch_in_window(
        &self,
        system_id: Uuid,
        from_ts: DateTime<Utc>,
        to_ts: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Event>, RepositoryError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE system_id = $1 AND timestamp >= $2 AND timestamp < $3 \
             ORDER BY timestamp ASC LIMIT $4"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(system_id)
            .bind(from_ts)
            .bind(to_ts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(EventRow::into_domain).collect())
    }

    pub async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Event>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(EventRow::into_domain).collect())
    }

    /// Stamps `scored_at` for a batch of events (I2: authoritative scored marker).
    #[instrument(skip(self, event_ids))]
    pub async fn mark_scored(
        &self,
        event_ids: &[Uuid],
        scored_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        for chunk in event_ids.chunks(5000) {
            sqlx::query("UPDATE events SET scored_at = $1 WHERE id = ANY($2)")
                .bind(scored_at)
                .bind(chunk)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn count_unscored(&self, system_id: Uuid) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM events WHERE system_id = $1 AND scored_at IS NULL",
        )
        .bind(system_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    pub async fn count_in_window(
        &self,
        system_id: Uuid,
        from_ts: DateTime<Utc>,
        to_ts: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM events WHERE system_id = $1 AND timestamp >= $2 AND timestamp < $3",
        )
        .bind(system_id)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Earliest event timestamp recorded for a system, used to seed the
    /// windower when no window has been created yet.
    pub async fn earliest_timestamp(
        &self,
        system_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row: (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT MIN(timestamp) FROM events WHERE system_id = $1")
                .bind(system_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// IDs of events in a window that have not been manually acknowledged
    /// (excluded from the meta-analyser's `max_event_score` per spec I4).
    pub async fn fetch_non_acknowledged_ids_in_window(
        &self,
        system_id: Uuid,
        from_ts: DateTime<Utc>,
        to_ts: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM events WHERE system_id = $1 AND timestamp >= $2 AND timestamp < $3 \
             AND acknowledged_at IS NULL",
        )
        .bind(system_id)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Deletes events older than each system's retention window. Tolerates
    /// events already consumed by a meta-result (no advisory lock needed; see
    /// the retention open question).
    pub async fn delete_expired(
        &self,
        system_id: Uuid,
        older_than: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM events WHERE system_id = $1 AND timestamp < $2")
            .bind(system_id)
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
