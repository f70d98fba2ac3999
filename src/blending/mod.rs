//! Effective-score blender (invariant I4): combines a window's meta-score
//! with its max per-event score into the single dashboard-facing value.

/// Blends `meta_score` and `max_event_score` with weight `w_meta`.
///
/// If `max_event_score == 0`, `meta_score` is clamped to 0 (and so is the
/// result) regardless of what the LLM reported — a window with no
/// meaningful per-event signal cannot be escalated by the meta call alone.
pub fn blend(meta_score: f64, max_event_score: f64, w_meta: f64) -> (f64, f64) {
    if max_event_score <= 0.0 {
        return (0.0, 0.0);
    }
    let meta_score = meta_score.clamp(0.0, 1.0);
    let max_event_score = max_event_score.clamp(0.0, 1.0);
    let effective = w_meta * meta_score + (1.0 - w_meta) * max_event_score;
    (effective, meta_score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blends_with_configured_weight() {
        let (effective, meta) = blend(0.8, 0.9, 0.7);
        assert!((meta - 0.8).abs() < 1e-9);
        assert!((effective - (0.7 * 0.8 + 0.3 * 0.9)).abs() < 1e-9);
    }

    #[test]
    fn zero_max_event_score_clamps_everything_to_zero() {
        let (effective, meta) = blend(0.95, 0.0, 0.7);
        assert_eq!(effective, 0.0);
        assert_eq!(meta, 0.0);
    }

    #[test]
    fn scenario_s2_from_spec() {
        let (effective, _) = blend(0.8, 0.9, 0.7);
        assert!((effective - 0.83).abs() < 1e-9);
    }
}
