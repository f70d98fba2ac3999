//! Message template repository: the canonicalisation/dedup cache.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{MessageTemplate, ScoreVector};
use crate::error::RepositoryError;

#[derive(FromRow)]
struct TemplateRow {
    id: Uuid,
    system_id: Uuid,
    template_text: String,
    pattern_hash: String,
    occurrence_count: i64,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
    last_scored_at: Option<DateTime<Utc>>,
    cached_scores: Option<serde_json::Value>,
    score_count: i64,
    avg_max_score: f64,
}

impl TemplateRow {
    fn into_domain(self) -> Result<MessageTemplate, RepositoryError> {
        let cached_scores = match self.cached_scores {
            Some(v) => {
                let raw: Vec<f64> = serde_json::from_value(v)?;
                Some(ScoreVector::from_raw(&raw))
            }
            None => None,
        };
        Ok(MessageTemplate {
            id: self.id,
            system_id: self.system_id,
            template_text: self.template_text,
            pattern_hash: self.pattern_hash,
            occurrence_count: self.occurrence_count,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            last_scored_at: self.last_scored_at,
            cached_scores,
            score_count: self.score_count,
            avg_max_score: self.avg_max_score,
        })
    }
}

const TEMPLATE_COLUMNS: &str = "id, system_id, template_text, pattern_hash, occurrence_count, \
     first_seen_at, last_seen_at, last_scored_at, cached_scores, score_count, avg_max_score";

pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_hash(
        &self,
        system_id: Uuid,
        pattern_hash: &str,
    ) -> Result<Option<MessageTemplate>, RepositoryError> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM message_templates WHERE system_id = $1 AND pattern_hash = $2"
        );
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(system_id)
            .bind(pattern_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TemplateRow::into_domain).transpose()
    }

    /// Inserts a brand-new template, or if one already exists for this
    /// `(system_id, pattern_hash)` (a race with another scoring pass),
    /// returns the existing row untouched.
    #[instrument(skip(self, template))]
    pub async fn upsert_new(
        &self,
        template: &MessageTemplate,
    ) -> Result<MessageTemplate, RepositoryError> {
        let sql = format!(
            "INSERT INTO message_templates \
                (id, system_id, template_text, pattern_hash, occurrence_count, \
                 first_seen_at, last_seen_at, last_scored_at, cached_scores, score_count, avg_max_score) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (system_id, pattern_hash) DO UPDATE SET system_id = message_templates.system_id \
             RETURNING {TEMPLATE_COLUMNS}"
        );
        let cached_scores = template
            .cached_scores
            .as_ref()
            .map(|s| serde_json::to_value(s.to_vec()))
            .transpose()?;
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(template.id)
            .bind(template.system_id)
            .bind(&template.template_text)
            .bind(&template.pattern_hash)
            .bind(template.occurrence_count)
            .bind(template.first_seen_at)
            .bind(template.last_seen_at)
            .bind(template.last_scored_at)
            .bind(cached_scores)
            .bind(template.score_count)
            .bind(template.avg_max_score)
            .fetch_one(&self.pool)
            .await?;
        row.into_domain()
    }

    /// Bulk-updates occurrence counts and `last_seen_at` for templates already
    /// seen in this batch, via `UPDATE ... FROM (VALUES ...)`.
    #[instrument(skip(self, updates))]
    pub async fn bulk_touch(
        &self,
        updates: &[(Uuid, i64, DateTime<Utc>)],
    ) -> Result<(), RepositoryError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "UPDATE message_templates AS t SET \
             occurrence_count = t.occurrence_count + v.delta, \
             last_seen_at = GREATEST(t.last_seen_at, v.seen_at) \
             FROM (",
        );
        builder.push_values(updates, |mut b, (id, delta, seen_at)| {
            b.push_bind(id).push_bind(delta).push_bind(seen_at);
        });
        builder.push(") AS v(id, delta, seen_at) WHERE t.id = v.id");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Persists a fresh LLM score for a template: updates the cache and folds
    /// the max criterion score into the running average (spec §4.4 step 8).
    #[instrument(skip(self, scores))]
    pub async fn record_scored(
        &self,
        template_id: Uuid,
        scores: &ScoreVector,
        scored_at: DateTime<Utc>,
        new_avg_max_score: f64,
        new_score_count: i64,
    ) -> Result<(), RepositoryError> {
        let json = serde_json::to_value(scores.to_vec())?;
        sqlx::query(
            "UPDATE message_templates SET cached_scores = $1, last_scored_at = $2, \
             avg_max_score = $3, score_count = $4 WHERE id = $5",
        )
        .bind(json)
        .bind(scored_at)
        .bind(new_avg_max_score)
        .bind(new_score_count)
        .bind(template_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bulk-writes fresh LLM scores for several templates in one
    /// `UPDATE ... FROM (VALUES ...)` statement (spec §4.4 step 8), avoiding
    /// one round-trip per template in a scoring batch.
    #[instrument(skip(self, updates))]
    pub async fn record_scored_bulk(
        &self,
        updates: &[(Uuid, ScoreVector, DateTime<Utc>, f64, i64)],
    ) -> Result<(), RepositoryError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(updates.len());
        for (id, scores, scored_at, avg_max_score, score_count) in updates {
            rows.push((
                *id,
                serde_json::to_value(scores.to_vec())?,
                *scored_at,
                *avg_max_score,
                *score_count,
            ));
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "UPDATE message_templates AS t SET \
             cached_scores = v.cached_scores, last_scored_at = v.last_scored_at, \
             avg_max_score = v.avg_max_score, score_count = v.score_count \
             FROM (",
        );
        builder.push_values(&rows, |mut b, (id, json, scored_at, avg_max_score, score_count)| {
            b.push_bind(id)
                .push_bind(json)
                .push_bind(scored_at)
                .push_bind(avg_max_score)
                .push_bind(score_count);
        });
        builder.push(") AS v(id, cached_scores, last_scored_at, avg_max_score, score_count) WHERE t.id = v.id");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    pub async fn fetch_for_window(
        &self,
        system_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MessageTemplate>, RepositoryError> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM message_templates \
             WHERE system_id = $1 AND last_seen_at >= $2 ORDER BY last_seen_at ASC"
        );
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(system_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TemplateRow::into_domain).collect()
    }
}
