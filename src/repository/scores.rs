//! Per-event score rows.

use sqlx::{FromRow, PgPool, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{Criterion, ScoreVector};
use crate::error::RepositoryError;

pub struct ScoreRepository {
    pool: PgPool,
}

#[derive(FromRow)]
struct ScoreRow {
    event_id: Uuid,
    criterion: String,
    score: f64,
}

impl ScoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Writes only non-zero criterion scores for each event (I2): an event
    /// with an all-zero vector produces no rows here.
    #[instrument(skip(self, per_event))]
    pub async fn insert_non_zero(
        &self,
        per_event: &[(Uuid, ScoreVector)],
    ) -> Result<(), RepositoryError> {
        let rows: Vec<(Uuid, Criterion, f64)> = per_event
            .iter()
            .flat_map(|(event_id, scores)| {
                scores
                    .iter()
                    .filter(|(_, v)| *v > 0.0)
                    .map(move |(c, v)| (*event_id, c, v))
            })
            .collect();

        if rows.is_empty() {
            return Ok(());
        }

        for chunk in rows.chunks(3000) {
            let mut builder: QueryBuilder<sqlx::Postgres> =
                QueryBuilder::new("INSERT INTO event_scores (event_id, criterion, score) ");
            builder.push_values(chunk, |mut b, (event_id, criterion, score)| {
                b.push_bind(event_id)
                    .push_bind(criterion.slug())
                    .push_bind(score);
            });
            builder.push(" ON CONFLICT (event_id, criterion) DO NOTHING");
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn fetch_for_events(
        &self,
        event_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Criterion, f64)>, RepositoryError> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for chunk in event_ids.chunks(5000) {
            let rows = sqlx::query_as::<_, ScoreRow>(
                "SELECT event_id, criterion, score FROM event_scores WHERE event_id = ANY($1)",
            )
            .bind(chunk)
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                if let Some(criterion) = Criterion::from_slug(&row.criterion) {
                    out.push((row.event_id, criterion, row.score));
                }
            }
        }
        Ok(out)
    }

    /// Max score per criterion across the given events, used when composing
    /// a window's `max_event_score` (invariant I4).
    pub async fn max_per_criterion(
        &self,
        event_ids: &[Uuid],
    ) -> Result<ScoreVector, RepositoryError> {
        let rows = self.fetch_for_events(event_ids).await?;
        let mut max = ScoreVector::ZERO;
        for (_, criterion, score) in rows {
            if score > max.get(criterion) {
                max.set(criterion, score);
            }
        }
        Ok(max)
    }
}
