//! Windower (spec §4.5): partitions each system's time axis into
//! epoch-aligned, closed-open intervals of fixed width and materialises the
//! ones that are fully past and non-empty.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{MonitoredSystem, Window, WindowTrigger};
use crate::error::WindowError;
use crate::repository::Repositories;

/// Floors `ts` to the start of the `window_minutes`-wide bucket it falls in,
/// aligned to the Unix epoch (not to each system's first event), so windows
/// are comparable across systems and stable across restarts.
pub fn align_to_window_start(ts: DateTime<Utc>, window_minutes: i64) -> DateTime<Utc> {
    let width_secs = window_minutes.max(1) * 60;
    let epoch_secs = ts.timestamp();
    let floored = (epoch_secs.div_euclid(width_secs)) * width_secs;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

pub struct Windower {
    repos: Repositories,
}

impl Windower {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Creates every window for `system` that is fully in the past, contains
    /// at least one event, and does not already exist. Returns the newly
    /// created windows (existing ones are left untouched and not returned).
    #[instrument(skip(self, system))]
    pub async fn run_for_system(
        &self,
        system: &MonitoredSystem,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Window>, WindowError> {
        let width = Duration::minutes(window_minutes.max(1));

        let resume_point = self.repos.windows.latest_to_ts(system.id).await?;
        let earliest_event = self.repos.events.earliest_timestamp(system.id).await?;

        let start = match (resume_point, earliest_event) {
            (Some(to_ts), _) => to_ts,
            (None, Some(first_event)) => align_to_window_start(first_event, window_minutes),
            (None, None) => return Ok(Vec::new()),
        };

        let mut created = Vec::new();
        let mut from_ts = start;
        loop {
            let to_ts = from_ts + width;
            if to_ts > now {
                break;
            }

            let count = self
                .repos
                .events
                .count_in_window(system.id, from_ts, to_ts)
                .await?;
            if count > 0 {
                let window = self
                    .repos
                    .windows
                    .find_or_create(system.id, from_ts, to_ts, WindowTrigger::Time)
                    .await?;
                created.push(window);
            }

            from_ts = to_ts;
        }

        Ok(created)
    }

    /// Runs window creation for every given system, collecting per-system
    /// results; one system's failure does not stop the others (the
    /// orchestrator is the layer that decides whether to keep going, but the
    /// windower itself never lets a partial batch abort the whole call).
    pub async fn run(
        &self,
        systems: &[MonitoredSystem],
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> Vec<(Uuid, Result<Vec<Window>, WindowError>)> {
        let mut out = Vec::with_capacity(systems.len());
        for system in systems {
            let result = self.run_for_system(system, window_minutes, now).await;
            out.push((system.id, result));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_to_epoch_boundary_not_arbitrary_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 30).unwrap();
        let aligned = align_to_window_start(ts, 5);
        assert_eq!(aligned, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn already_aligned_timestamp_is_unchanged() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(align_to_window_start(ts, 5), ts);
    }
}
