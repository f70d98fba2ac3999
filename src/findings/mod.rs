//! Finding lifecycle engine (spec §4.7): turns a meta-analysis result's
//! structured findings into persistent, deduplicated, decaying,
//! auto-resolving entities.

use std::collections::HashSet;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::config::TuningConfig;
use crate::domain::{Finding, FindingSeverity as Severity, RawFinding, ResolutionReason};
use crate::error::FindingError;
use crate::meta::MetaOutcome;
use crate::repository::Repositories;

pub struct FindingOutcome {
    pub resolved_by_llm: Vec<Uuid>,
    pub newly_created: Vec<Uuid>,
    pub reoccurred: Vec<Uuid>,
    pub auto_resolved_stale: Vec<Uuid>,
    pub auto_closed_over_capacity: Vec<Uuid>,
}

pub struct FindingEngine {
    repos: Repositories,
}

impl FindingEngine {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    #[instrument(skip(self, outcome, tuning))]
    pub async fn process_window(
        &self,
        outcome: &MetaOutcome,
        tuning: &TuningConfig,
    ) -> Result<FindingOutcome, FindingError> {
        let now = Utc::now();
        let system_id = outcome.system_id;

        let resolved_by_llm = self.resolve_by_index(outcome, now).await?;

        let (newly_created, reoccurred, matched_fingerprints) = self
            .ingest_new_findings(system_id, &outcome.meta_result.findings, outcome.meta_result.id, now, tuning)
            .await?;

        let auto_resolved_stale = self
            .track_staleness(
                &outcome.open_findings_snapshot,
                &resolved_by_llm,
                &matched_fingerprints,
                now,
                tuning,
            )
            .await?;

        let auto_closed_over_capacity = self.enforce_open_capacity(system_id, now, tuning).await?;

        Ok(FindingOutcome {
            resolved_by_llm,
            newly_created,
            reoccurred,
            auto_resolved_stale,
            auto_closed_over_capacity,
        })
    }

    /// Step A: resolve findings the LLM pointed at by 1-based index into the
    /// prompt's open/acknowledged findings list.
    async fn resolve_by_index(
        &self,
        outcome: &MetaOutcome,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<Uuid>, FindingError> {
        let mut resolved = Vec::new();
        for &index in &outcome.resolved_indices {
            let Some(finding) = index
                .checked_sub(1)
                .and_then(|i| outcome.open_findings_snapshot.get(i))
            else {
                continue;
            };
            let mut finding = finding.clone();
            finding.resolve(
                now,
                ResolutionReason::LlmResolved { resolved_by_meta_id: outcome.meta_result.id },
            );
            self.repos.findings.update(&finding).await?;
            resolved.push(finding.id);
        }
        Ok(resolved)
    }

    /// Step B: fingerprint dedup ingestion of new findings, capped per window.
    /// Returns (newly created ids, reoccurred ids, fingerprints matched this window).
    async fn ingest_new_findings(
        &self,
        system_id: Uuid,
        raw_findings: &[RawFinding],
        meta_id: Uuid,
        now: chrono::DateTime<Utc>,
        tuning: &TuningConfig,
    ) -> Result<(Vec<Uuid>, Vec<Uuid>, HashSet<String>), FindingError> {
        let mut candidates: Vec<(String, &RawFinding)> =
            raw_findings.iter().map(|rf| (fingerprint(rf), rf)).collect();

        let mut reoccurred = Vec::new();
        let mut fresh: Vec<(String, &RawFinding)> = Vec::new();
        let mut matched_fingerprints = HashSet::new();

        for (fp, raw) in candidates.drain(..) {
            matched_fingerprints.insert(fp.clone());

            let existing = if tuning.finding_dedup_fuzzy_enabled {
                self.find_fuzzy_match(system_id, &fp, tuning.finding_dedup_threshold).await?
            } else {
                self.repos.findings.find_by_fingerprint(system_id, &fp).await?
            };

            match existing {
                Some(mut finding) => {
                    finding.reoccur(now);
                    finding.maybe_decay(
                        tuning.severity_decay_after_occurrences,
                        tuning.severity_decay_enabled,
                    );
                    self.repos.findings.update(&finding).await?;
                    reoccurred.push(finding.id);
                }
                None => fresh.push((fp, raw)),
            }
        }

        // Step B.3: cap brand-new insertions per window, keeping the
        // highest-severity ones.
        if fresh.len() > tuning.max_new_findings_per_window {
            fresh.sort_by(|(_, a), (_, b)| b.severity.cmp(&a.severity));
            fresh.truncate(tuning.max_new_findings_per_window);
        }

        let mut created = Vec::new();
        for (fp, raw) in fresh {
            let finding = Finding::new(
                system_id,
                raw.text.clone(),
                raw.severity,
                raw.criterion_slug.clone(),
                fp,
                meta_id,
                now,
            );
            self.repos.findings.insert(&finding).await?;
            created.push(finding.id);
        }

        Ok((created, reoccurred, matched_fingerprints))
    }

    /// Token-set Jaccard similarity fuzzy match against the system's open
    /// findings, used instead of exact fingerprint lookup when enabled.
    async fn find_fuzzy_match(
        &self,
        system_id: Uuid,
        fingerprint: &str,
        threshold: f64,
    ) -> Result<Option<Finding>, FindingError> {
        let open = self.repos.findings.open_or_acknowledged(system_id).await?;
        let candidate_tokens = token_set(fingerprint);
        let mut best: Option<(f64, Finding)> = None;
        for finding in open {
            let score = jaccard(&candidate_tokens, &token_set(&finding.fingerprint));
            if score >= threshold && best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, finding));
            }
        }
        Ok(best.map(|(_, f)| f))
    }

    /// Step C: findings open at the start of the window that neither got an
    /// explicit LLM resolution nor matched a fingerprint this round accrue a
    /// miss; enough consecutive misses auto-resolves them as stale.
    async fn track_staleness(
        &self,
        open_at_start: &[Finding],
        resolved_by_llm: &[Uuid],
        matched_fingerprints: &HashSet<String>,
        now: chrono::DateTime<Utc>,
        tuning: &TuningConfig,
    ) -> Result<Vec<Uuid>, FindingError> {
        let mut auto_resolved = Vec::new();
        let mut missed_ids = Vec::new();

        for finding in open_at_start {
            if resolved_by_llm.contains(&finding.id) {
                continue;
            }
            if matched_fingerprints.contains(&finding.fingerprint) {
                continue;
            }
            missed_ids.push(finding.id);
        }

        self.repos.findings.increment_misses(&missed_ids).await?;

        for id in missed_ids {
            if let Some(mut finding) = self.repos.findings.find_by_id(id).await? {
                if finding.consecutive_misses >= tuning.auto_resolve_after_misses {
                    finding.resolve(now, ResolutionReason::AutoResolvedStale);
                    self.repos.findings.update(&finding).await?;
                    auto_resolved.push(finding.id);
                }
            }
        }

        Ok(auto_resolved)
    }

    /// Step B.4: when a system's open findings exceed capacity, auto-close
    /// the oldest low-severity ones (never the newest or highest-severity).
    async fn enforce_open_capacity(
        &self,
        system_id: Uuid,
        now: chrono::DateTime<Utc>,
        tuning: &TuningConfig,
    ) -> Result<Vec<Uuid>, FindingError> {
        let count = self.repos.findings.count_open(system_id).await?;
        let cap = tuning.max_open_findings_per_system as i64;
        if count <= cap {
            return Ok(Vec::new());
        }
        let excess = (count - cap) as usize;

        // `oldest_open_beyond(0)` returns the whole open set, oldest first;
        // re-ranking by severity-then-age picks the lowest-severity,
        // oldest-within-that-severity findings to close first.
        let mut all_open = self.repos.findings.oldest_open_beyond(system_id, 0).await?;
        all_open.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.created_at.cmp(&b.created_at)));

        let mut closed = Vec::new();
        for mut finding in all_open.into_iter().take(excess) {
            finding.resolve(now, ResolutionReason::AutoClosedOverCapacity);
            self.repos.findings.update(&finding).await?;
            closed.push(finding.id);
        }
        Ok(closed)
    }
}

/// Normalised lower-cased text with numbers and UUIDs replaced by sentinels,
/// truncated to 120 chars, joined with severity and criterion (OQ3: this is
/// the single canonical fingerprint form).
pub fn fingerprint(raw: &RawFinding) -> String {
    let normalized = sentinelize(&raw.text.to_lowercase());
    let truncated: String = normalized.chars().take(120).collect();
    format!(
        "{}|{}|{}",
        truncated,
        raw.severity.as_str(),
        raw.criterion_slug.as_deref().unwrap_or("")
    )
}

fn sentinelize(text: &str) -> String {
    let uuid_re = uuid_pattern();
    let number_re = number_pattern();
    let replaced = uuid_re.replace_all(text, "<uuid>");
    number_re.replace_all(&replaced, "<num>").into_owned()
}

fn uuid_pattern() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
    })
}

fn number_pattern() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\d+").unwrap())
}

fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str, severity: Severity) -> RawFinding {
        RawFinding { text: text.to_string(), severity, criterion_slug: Some("operational_risk".to_string()) }
    }

    #[test]
    fn fingerprint_replaces_numbers_and_uuids() {
        let a = raw("disk full on /var/log, 98% used, id 123e4567-e89b-12d3-a456-426614174000", Severity::High);
        let b = raw("disk full on /var/log, 95% used, id 123e4567-e89b-12d3-a456-426614174abc", Severity::High);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_by_severity_and_criterion() {
        let a = RawFinding { text: "x".into(), severity: Severity::High, criterion_slug: Some("anomaly".into()) };
        let b = RawFinding { text: "x".into(), severity: Severity::Low, criterion_slug: Some("anomaly".into()) };
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_truncates_to_120_chars() {
        let long_text = "a".repeat(500);
        let fp = fingerprint(&raw(&long_text, Severity::Info));
        let body = fp.split('|').next().unwrap();
        assert_eq!(body.chars().count(), 120);
    }

    #[test]
    fn jaccard_identical_sets_is_one() {
        let a = token_set("disk full on host-1");
        let b = token_set("disk full on host-1");
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn jaccard_disjoint_sets_is_zero() {
        let a = token_set("alpha beta");
        let b = token_set("gamma delta");
        assert_eq!(jaccard(&a, &b), 0.0);
    }
}
