//! Windows and the per-window effective scores derived from meta-analysis.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{Criterion, EffectiveScore, Window, WindowTrigger};
use crate::error::RepositoryError;

#[derive(FromRow)]
struct WindowRow {
    id: Uuid,
    system_id: Uuid,
    from_ts: DateTime<Utc>,
    to_ts: DateTime<Utc>,
    trigger: String,
}

impl WindowRow {
    fn into_domain(self) -> Window {
        Window {
            id: self.id,
            system_id: self.system_id,
            from_ts: self.from_ts,
            to_ts: self.to_ts,
            trigger: match self.trigger.as_str() {
                "event-count" => WindowTrigger::EventCount,
                _ => WindowTrigger::Time,
            },
        }
    }
}

pub struct WindowRepository {
    pool: PgPool,
}

impl WindowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a window if one doesn't already exist for `(system_id, from_ts,
    /// to_ts)` (invariant I3 depends on this uniqueness), returning the
    /// existing row on conflict rather than a fresh id.
    #[instrument(skip(self))]
    pub async fn find_or_create(
        &self,
        system_id: Uuid,
        from_ts: DateTime<Utc>,
        to_ts: DateTime<Utc>,
        trigger: WindowTrigger,
    ) -> Result<Window, RepositoryError> {
        let trigger_str = match trigger {
            WindowTrigger::Time => "time",
            WindowTrigger::EventCount => "event-count",
        };
        let row = sqlx::query_as::<_, WindowRow>(
            "INSERT INTO windows (id, system_id, from_ts, to_ts, trigger) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (system_id, from_ts, to_ts) DO UPDATE SET system_id = windows.system_id \
             RETURNING id, system_id, from_ts, to_ts, trigger",
        )
        .bind(Uuid::new_v4())
        .bind(system_id)
        .bind(from_ts)
        .bind(to_ts)
        .bind(trigger_str)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_domain())
    }

    /// True if this window already has a meta-result (I3 short-circuit).
    pub async fn has_meta_result(&self, window_id: Uuid) -> Result<bool, RepositoryError> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM meta_results WHERE window_id = $1")
                .bind(window_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Windows for a system that still lack a meta-result, oldest first —
    /// re-offered to the orchestrator every tick so a window whose
    /// meta-analysis failed on a transient error (and so was never given a
    /// row) is retried rather than lost once the windower moves past it.
    pub async fn pending_without_meta(
        &self,
        system_id: Uuid,
    ) -> Result<Vec<Window>, RepositoryError> {
        let rows = sqlx::query_as::<_, WindowRow>(
            "SELECT w.id, w.system_id, w.from_ts, w.to_ts, w.trigger FROM windows w \
             LEFT JOIN meta_results m ON m.window_id = w.id \
             WHERE w.system_id = $1 AND m.window_id IS NULL \
             ORDER BY w.to_ts ASC",
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WindowRow::into_domain).collect())
    }

    pub async fn recent_for_system(
        &self,
        system_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Window>, RepositoryError> {
        let rows = sqlx::query_as::<_, WindowRow>(
            "SELECT id, system_id, from_ts, to_ts, trigger FROM windows \
             WHERE system_id = $1 ORDER BY to_ts DESC LIMIT $2",
        )
        .bind(system_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WindowRow::into_domain).collect())
    }

    /// Upserts the six per-criterion effective scores for a window in one
    /// batch (invariant I4 blending happens before this call).
    #[instrument(skip(self, scores))]
    pub async fn upsert_effective_scores(
        &self,
        scores: &[EffectiveScore],
    ) -> Result<(), RepositoryError> {
        if scores.is_empty() {
            return Ok(());
        }
        let mut builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "INSERT INTO effective_scores \
             (window_id, system_id, criterion, effective_value, meta_score, max_event_score) ",
        );
        builder.push_values(scores, |mut b, s| {
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
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// The end of the most recent window for a system, used by the windower
    /// to resume boundary-aligned window creation instead of starting over.
    pub async fn latest_to_ts(&self, system_id: Uuid) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row: (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT MAX(to_ts) FROM windows WHERE system_id = $1")
                .bind(system_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// All six per-criterion effective scores recorded for one window, fed
    /// into the alert evaluator after a meta-analysis run.
    pub async fn effective_scores_for_window(
        &self,
        window_id: Uuid,
    ) -> Result<Vec<EffectiveScore>, RepositoryError> {
        #[derive(FromRow)]
        struct Row {
            window_id: Uuid,
            system_id: Uuid,
            criterion: String,
            effective_value: f64,
            meta_score: f64,
            max_event_score: f64,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT window_id, system_id, criterion, effective_value, meta_score, max_event_score \
             FROM effective_scores WHERE window_id = $1",
        )
        .bind(window_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Criterion::from_slug(&r.criterion).map(|c| EffectiveScore {
                    window_id: r.window_id,
                    system_id: r.system_id,
                    criterion: c,
                    effective_value: r.effective_value,
                    meta_score: r.meta_score,
                    max_event_score: r.max_event_score,
                })
            })
            .collect())
    }

    pub async fn latest_effective_scores(
        &self,
        system_id: Uuid,
        criterion: Criterion,
        limit: i64,
    ) -> Result<Vec<EffectiveScore>, RepositoryError> {
        #[derive(FromRow)]
        struct Row {
            window_id: Uuid,
            system_id: Uuid,
            criterion: String,
            effective_value: f64,
            meta_score: f64,
            max_event_score: f64,
        }
        let rows = sqlx::query_as::<_, Row>(
            "SELECT e.window_id, e.system_id, e.criterion, e.effective_value, \
                    e.meta_score, e.max_event_score \
             FROM effective_scores e JOIN windows w ON w.id = e.window_id \
             WHERE e.system_id = $1 AND e.criterion = $2 \
             ORDER BY w.to_ts DESC LIMIT $3",
        )
        .bind(system_id)
        .bind(criterion.slug())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Criterion::from_slug(&r.criterion).map(|c| EffectiveScore {
                    window_id: r.window_id,
                    system_id: r.system_id,
                    criterion: c,
                    effective_value: r.effective_value,
                    meta_score: r.meta_score,
                    max_event_score: r.max_event_score,
                })
            })
            .collect())
    }
}
