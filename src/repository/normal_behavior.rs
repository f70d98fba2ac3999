//! Normal-behavior exclusion templates, cached per system by the scorer.

use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::NormalBehaviorTemplate;
use crate::error::RepositoryError;

#[derive(FromRow)]
struct Row {
    id: Uuid,
    system_id: Uuid,
    message_pattern: String,
    host_pattern: Option<String>,
    program_pattern: Option<String>,
    enabled: bool,
}

impl Row {
    fn into_domain(self) -> NormalBehaviorTemplate {
        NormalBehaviorTemplate {
            id: self.id,
            system_id: self.system_id,
            message_pattern: self.message_pattern,
            host_pattern: self.host_pattern,
            program_pattern: self.program_pattern,
            enabled: self.enabled,
        }
    }
}

pub struct NormalBehaviorRepository {
    pool: PgPool,
}

impl NormalBehaviorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enabled_for_system(
        &self,
        system_id: Uuid,
    ) -> Result<Vec<NormalBehaviorTemplate>, RepositoryError> {
        let rows = sqlx::query_as::<_, Row>(
            "SELECT id, system_id, message_pattern, host_pattern, program_pattern, enabled \
             FROM normal_behavior_templates WHERE system_id = $1 AND enabled = TRUE",
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Row::into_domain).collect())
    }
}
