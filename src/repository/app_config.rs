//! The `app_config(key, value)` table backing [`crate::config::AppConfigCache`].

use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

use crate::error::RepositoryError;

#[derive(FromRow)]
struct ConfigRow {
    key: String,
    value: serde_json::Value,
}

pub struct AppConfigRepository {
    pool: PgPool,
}

impl AppConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load_all(&self) -> Result<HashMap<String, serde_json::Value>, RepositoryError> {
        let rows = sqlx::query_as::<_, ConfigRow>("SELECT key, value FROM app_config")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| (r.key, r.value)).collect())
    }

    pub async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_config (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
