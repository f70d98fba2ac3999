//! Per-call LLM usage/cost audit trail.

use sqlx::PgPool;
use tracing::instrument;

use crate::domain::LlmUsage;
use crate::error::RepositoryError;

pub struct LlmUsageRepository {
    pool: PgPool,
}

impl LlmUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, usage))]
    pub async fn insert(&self, usage: &LlmUsage) -> Result<(), RepositoryError> {
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
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn total_cost_since(
        &self,
        system_id: uuid::Uuid,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<f64, RepositoryError> {
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(cost_estimate) FROM llm_usage WHERE system_id = $1 AND created_at >= $2",
        )
        .bind(system_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.unwrap_or(0.0))
    }
}
