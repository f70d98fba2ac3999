//! Meta-analysis result persistence.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{EffectiveScore, LlmUsage, MetaResult, RawFinding, ScoreVector};
use crate::error::RepositoryError;

#[derive(FromRow)]
struct MetaResultRow {
    id: Uuid,
    window_id: Uuid,
    system_id: Uuid,
    meta_scores: serde_json::Value,
    summary: String,
    findings: serde_json::Value,
    recommended_action: Option<String>,
    key_event_ids: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl MetaResultRow {
    fn into_domain(self) -> Result<MetaResult, RepositoryError> {
        let raw_scores: Vec<f64> = serde_json::from_value(self.meta_scores)?;
        let findings: Vec<RawFinding> = serde_json::from_value(self.findings)?;
        let key_event_ids: Vec<Uuid> = serde_json::from_value(self.key_event_ids)?;
        Ok(MetaResult {
            id: self.id,
            window_id: self.window_id,
            system_id: self.system_id,
            meta_scores: ScoreVector::from_raw(&raw_scores),
            summary: self.summary,
            findings,
            recommended_action: self.recommended_action,
            key_event_ids,
            created_at: self.created_at,
        })
    }
}

const META_COLUMNS: &str = "id, window_id, system_id, meta_scores, summary, findings, \
     recommended_action, key_event_ids, created_at";

pub struct MetaResultRepository {
    pool: PgPool,
}

impl MetaResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the meta-result for a window. Relies on `meta_results.window_id`
    /// being UNIQUE to enforce invariant I3 at the database level: a second
    /// insert for the same window fails rather than silently duplicating.
    #[instrument(skip(self, result))]
    pub async fn insert(&self, result: &MetaResult) -> Result<(), RepositoryError> {
        let meta_scores = serde_json::to_value(result.meta_scores.to_vec())?;
        let findings = serde_json::to_value(&result.findings)?;
        let key_event_ids = serde_json::to_value(&result.key_event_ids)?;
        sqlx::query(
            "INSERT INTO meta_results \
                (id, window_id, system_id, meta_scores, summary, findings, \
                 recommended_action, key_event_ids, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(result.id)
        .bind(result.window_id)
        .bind(result.system_id)
        .bind(meta_scores)
        .bind(&result.summary)
        .bind(findings)
        .bind(&result.recommended_action)
        .bind(key_event_ids)
        .bind(result.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes a window's meta-result, its six effective scores, and the
    /// associated LLM usage record in a single transaction, so a crash
    /// mid-write can never leave a window with scores but no meta-result
    /// (or vice versa).
    #[instrument(skip(self, result, effective_scores, usage))]
    pub async fn write_window_result(
        &self,
        result: &MetaResult,
        effective_scores: &[EffectiveScore],
        usage: &LlmUsage,
    ) -> Result<(), RepositoryError> {
        let meta_scores = serde_json::to_value(result.meta_scores.to_vec())?;
        let findings = serde_json::to_value(&result.findings)?;
        let key_event_ids = serde_json::to_value(&result.key_event_ids)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO meta_results \
                (id, window_id, system_id, meta_scores, summary, findings, \
                 recommended_action, key_event_ids, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(result.id)
        .bind(result.window_id)
        .bind(result.system_id)
        .bind(meta_scores)
        .bind(&result.summary)
        .bind(findings)
        .bind(&result.recommended_action)
        .bind(key_event_ids)
        .bind(result.created_at)
        .execute(&mut *tx)
        .await?;

        if !effective_scores.is_empty() {
            let mut builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
                "INSERT INTO effective_scores \
                 (window_id, system_id, criterion, effective_value, meta_score, max_event_score) ",
            );
            builder.push_values(effective_scores, |mut b, s| {
                b.push_bind(s.window_id)
                    .push_bind(s.system_id)
                    .push_bind(s.criterion.slug())
                    .push_bind(s.effective_value)
                    .push_bind(s.meta_score)
                    .push_bind(s.max_event_score);
            });
            builder.push(
                " ON CONFLICT (window_id, criterion) DO UPDATE SET \
                 effective_value = EXCLUDED.effective_value, \
                 meta_score = EXCLUDED.meta_score, \
                 max_event_score = EXCLUDED.max_event_score",
            );
            builder.build().execute(&mut *tx).await?;
        }

        sqlx::query(
            "INSERT INTO llm_usage \
                (id, run_type, model, system_id, window_id, event_count, \
                 token_input, token_output, request_count, cost_estimate, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(usage.id)
        .bind(usage.run_type.as_str())
        .bind(&usage.model)
        .bind(usage.system_id)
        .bind(usage.window_id)
        .bind(usage.event_count)
        .bind(usage.token_input)
        .bind(usage.token_output)
        .bind(usage.request_count)
        .bind(usage.cost_estimate)
        .bind(usage.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The last `limit` meta-result summaries for a system, most recent last,
    /// used to build the meta-analyser's sliding context.
    pub async fn recent_summaries(
        &self,
        system_id: Uuid,
        limit: i64,
    ) -> Result<Vec<(String, DateTime<Utc>)>, RepositoryError> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT summary, created_at FROM meta_results \
             WHERE system_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(system_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().rev().collect())
    }

    pub async fn get_by_window(
        &self,
        window_id: Uuid,
    ) -> Result<Option<MetaResult>, RepositoryError> {
        let sql = format!("SELECT {META_COLUMNS} FROM meta_results WHERE window_id = $1");
        let row = sqlx::query_as::<_, MetaResultRow>(&sql)
            .bind(window_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(MetaResultRow::into_domain).transpose()
    }
}
