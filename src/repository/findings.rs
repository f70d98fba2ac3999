//! Finding lifecycle persistence.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{Finding, FindingStatus, FindingSeverity as Severity};
use crate::error::RepositoryError;

#[derive(FromRow)]
struct FindingRow {
    id: Uuid,
    system_id: Uuid,
    status: String,
    severity: String,
    original_severity: String,
    criterion_slug: Option<String>,
    text: String,
    fingerprint: String,
    occurrence_count: i64,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    consecutive_misses: i32,
    created_by_meta_id: Uuid,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by_meta_id: Option<Uuid>,
    resolution_note: Option<String>,
}

impl FindingRow {
    fn into_domain(self) -> Finding {
        Finding {
            id: self.id,
            system_id: self.system_id,
            status: match self.status.as_str() {
                "acknowledged" => FindingStatus::Acknowledged,
                "resolved" => FindingStatus::Resolved,
                _ => FindingStatus::Open,
            },
            severity: Severity::from_str_default_medium(&self.severity),
            original_severity: Severity::from_str_default_medium(&self.original_severity),
            criterion_slug: self.criterion_slug,
            text: self.text,
            fingerprint: self.fingerprint,
            occurrence_count: self.occurrence_count,
            created_at: self.created_at,
            last_seen_at: self.last_seen_at,
            consecutive_misses: self.consecutive_misses,
            created_by_meta_id: self.created_by_meta_id,
            resolved_at: self.resolved_at,
            resolved_by_meta_id: self.resolved_by_meta_id,
            resolution_note: self.resolution_note,
        }
    }
}

fn status_str(status: FindingStatus) -> &'static str {
    match status {
        FindingStatus::Open => "open",
        FindingStatus::Acknowledged => "acknowledged",
        FindingStatus::Resolved => "resolved",
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

const FINDING_COLUMNS: &str = "id, system_id, status, severity, original_severity, \
     criterion_slug, text, fingerprint, occurrence_count, created_at, last_seen_at, \
     consecutive_misses, created_by_meta_id, resolved_at, resolved_by_meta_id, resolution_note";

pub struct FindingRepository {
    pool: PgPool,
}

impl FindingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open or acknowledged findings for a system, oldest first — the set
    /// the meta-analyser indexes into its prompt and whose ordinal positions
    /// `resolved_indices` refer to.
    pub async fn open_or_acknowledged(
        &self,
        system_id: Uuid,
    ) -> Result<Vec<Finding>, RepositoryError> {
        let sql = format!(
            "SELECT {FINDING_COLUMNS} FROM findings \
             WHERE system_id = $1 AND status IN ('open', 'acknowledged') \
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, FindingRow>(&sql)
            .bind(system_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(FindingRow::into_domain).collect())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Finding>, RepositoryError> {
        let sql = format!("SELECT {FINDING_COLUMNS} FROM findings WHERE id = $1");
        let row = sqlx::query_as::<_, FindingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(FindingRow::into_domain))
    }

    /// The open or acknowledged finding with this fingerprint, if any — a
    /// resolved finding never matches, since a fresh occurrence starts a new
    /// row rather than reopening a terminal one (P5).
    pub async fn find_by_fingerprint(
        &self,
        system_id: Uuid,
        fingerprint: &str,
    ) -> Result<Option<Finding>, RepositoryError> {
        let sql = format!(
            "SELECT {FINDING_COLUMNS} FROM findings \
             WHERE system_id = $1 AND fingerprint = $2 AND status <> 'resolved'"
        );
        let row = sqlx::query_as::<_, FindingRow>(&sql)
            .bind(system_id)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(FindingRow::into_domain))
    }

    #[instrument(skip(self, finding))]
    pub async fn insert(&self, finding: &Finding) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO findings ({FINDING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(finding.id)
        .bind(finding.system_id)
        .bind(status_str(finding.status))
        .bind(severity_str(finding.severity))
        .bind(severity_str(finding.original_severity))
        .bind(&finding.criterion_slug)
        .bind(&finding.text)
        .bind(&finding.fingerprint)
        .bind(finding.occurrence_count)
        .bind(finding.created_at)
        .bind(finding.last_seen_at)
        .bind(finding.consecutive_misses)
        .bind(finding.created_by_meta_id)
        .bind(finding.resolved_at)
        .bind(finding.resolved_by_meta_id)
        .bind(&finding.resolution_note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists the full mutable state of an existing finding (reoccurrence,
    /// decay, resolution, miss-tracking all flow through here).
    #[instrument(skip(self, finding))]
    pub async fn update(&self, finding: &Finding) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE findings SET status = $1, severity = $2, occurrence_count = $3, \
             last_seen_at = $4, consecutive_misses = $5, resolved_at = $6, \
             resolved_by_meta_id = $7, resolution_note = $8 WHERE id = $9",
        )
        .bind(status_str(finding.status))
        .bind(severity_str(finding.severity))
        .bind(finding.occurrence_count)
        .bind(finding.last_seen_at)
        .bind(finding.consecutive_misses)
        .bind(finding.resolved_at)
        .bind(finding.resolved_by_meta_id)
        .bind(&finding.resolution_note)
        .bind(finding.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Findings not refreshed in this window, used to increment
    /// `consecutive_misses` in bulk for staleness tracking.
    #[instrument(skip(self, finding_ids))]
    pub async fn increment_misses(&self, finding_ids: &[Uuid]) -> Result<(), RepositoryError> {
        if finding_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE findings SET consecutive_misses = consecutive_misses + 1 WHERE id = ANY($1)",
        )
        .bind(finding_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_open(&self, system_id: Uuid) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM findings WHERE system_id = $1 AND status IN ('open', 'acknowledged')",
        )
        .bind(system_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// The oldest open findings beyond capacity, used by
    /// `AutoClosedOverCapacity` resolution.
    pub async fn oldest_open_beyond(
        &self,
        system_id: Uuid,
        keep: i64,
    ) -> Result<Vec<Finding>, RepositoryError> {
        let sql = format!(
            "SELECT {FINDING_COLUMNS} FROM findings \
             WHERE system_id = $1 AND status IN ('open', 'acknowledged') \
             ORDER BY created_at ASC OFFSET $2"
        );
        let rows = sqlx::query_as::<_, FindingRow>(&sql)
            .bind(system_id)
            .bind(keep)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(FindingRow::into_domain).collect())
    }
}
