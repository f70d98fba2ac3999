//! Meta-Analyser (spec §4.6): for one window, assembles a sliding context of
//! previous summaries and open findings, asks the LLM oracle for a window
//! summary, and writes the meta-result/effective-scores/usage audit row in
//! one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::blending;
use crate::config::TuningConfig;
use crate::domain::{
    Criterion, EffectiveScore, Event, Finding, LlmUsage, MetaResult, MonitoredSystem, RunType,
    ScoreVector, Window,
};
use crate::error::MetaError;
use crate::llm::{cost, LlmClient, PromptSet};
use crate::metrics::PipelineMetrics;
use crate::repository::Repositories;
use crate::template;

/// Everything downstream components (finding lifecycle, alert evaluator)
/// need from one window's meta-analysis run.
pub struct MetaOutcome {
    pub window_id: Uuid,
    pub system_id: Uuid,
    pub meta_result: MetaResult,
    pub effective_scores: Vec<EffectiveScore>,
    /// 1-based indices into `open_findings_snapshot`, as returned by the LLM.
    pub resolved_indices: Vec<usize>,
    /// The open/acknowledged findings as they stood when the prompt was
    /// built — the same ordering the LLM's indices refer to.
    pub open_findings_snapshot: Vec<Finding>,
}

pub struct MetaAnalyser {
    repos: Repositories,
    llm: Arc<LlmClient>,
    prompts: PromptSet,
    metrics: Arc<PipelineMetrics>,
}

impl MetaAnalyser {
    pub fn new(
        repos: Repositories,
        llm: Arc<LlmClient>,
        prompts: PromptSet,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { repos, llm, prompts, metrics }
    }

    #[instrument(skip(self, system, window, tuning))]
    pub async fn analyze_window(
        &self,
        system: &MonitoredSystem,
        window: &Window,
        tuning: &TuningConfig,
    ) -> Result<MetaOutcome, MetaError> {
        let now = Utc::now();

        let events = self
            .repos
            .events
            .fetch_in_window(system.id, window.from_ts, window.to_ts, 200)
            .await?;
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();

        let scores_by_event = self.fetch_scores_chunked(&event_ids).await?;

        let open_findings = self.repos.findings.open_or_acknowledged(system.id).await?;
        let previous_summaries = self
            .repos
            .meta
            .recent_summaries(system.id, tuning.meta_context_summaries as i64)
            .await?;
        let source_labels = self
            .repos
            .systems
            .log_sources_for_system(system.id)
            .await?
            .into_iter()
            .map(|s| s.label)
            .collect::<Vec<_>>();

        let all_zero = events
            .iter()
            .all(|e| scores_by_event.get(&e.id).map(ScoreVector::is_all_zero).unwrap_or(true));

        let (response, usage) = if all_zero && tuning.skip_zero_score_meta {
            (neutral_response(), zero_usage(self.llm.model(), system.id, window.id, events.len(), now))
        } else {
            let prompt_events: Vec<&Event> = if tuning.filter_zero_score_meta_events {
                events
                    .iter()
                    .filter(|e| {
                        scores_by_event
                            .get(&e.id)
                            .map(|v| !v.is_all_zero())
                            .unwrap_or(false)
                    })
                    .collect()
            } else {
                events.iter().collect()
            };

            let groups = group_by_template(&prompt_events, &scores_by_event);
            let user_prompt = build_prompt(
                system,
                &source_labels,
                window,
                &previous_summaries,
                &open_findings,
                &groups,
            );

            let completion = self
                .llm
                .chat_json(&self.prompts.meta_system_prompt, &user_prompt)
                .await
                .map_err(|e| {
                    self.metrics.record_llm_call(false);
                    MetaError::Llm(e)
                })?;
            self.metrics.record_llm_call(true);

            let parsed = match crate::llm::parsing::parse_meta_response(&completion.content) {
                Ok(parsed) => parsed,
                Err(message) => {
                    // §4.6/§7: a parse failure records the window as failed
                    // with an empty meta-result — no effective-score update,
                    // no alert evaluation — rather than leaving it
                    // unwritten, which would otherwise lose the window
                    // forever once the windower moves past it.
                    let failed = MetaResult {
                        id: Uuid::new_v4(),
                        window_id: window.id,
                        system_id: system.id,
                        meta_scores: ScoreVector::ZERO,
                        summary: format!("meta-analysis parse failure: {message}"),
                        findings: Vec::new(),
                        recommended_action: None,
                        key_event_ids: Vec::new(),
                        created_at: now,
                    };
                    self.repos.meta.insert(&failed).await?;
                    return Err(MetaError::Parse { window_id: window.id.to_string(), message });
                }
            };

            let usage = LlmUsage {
                id: Uuid::new_v4(),
                run_type: RunType::Meta,
                model: self.llm.model().to_string(),
                system_id: system.id,
                window_id: Some(window.id),
                event_count: events.len() as i64,
                token_input: completion.input_tokens,
                token_output: completion.output_tokens,
                request_count: 1,
                cost_estimate: cost::estimate_cost(
                    self.llm.model(),
                    completion.input_tokens,
                    completion.output_tokens,
                ),
                created_at: now,
            };

            (parsed, usage)
        };

        let non_ack_ids = self
            .repos
            .events
            .fetch_non_acknowledged_ids_in_window(system.id, window.from_ts, window.to_ts)
            .await?;
        let max_vec = self.repos.scores.max_per_criterion(&non_ack_ids).await?;

        let mut effective_scores = Vec::with_capacity(6);
        for criterion in Criterion::ALL {
            let (effective_value, meta_score) = blending::blend(
                response.meta_scores.get(criterion),
                max_vec.get(criterion),
                tuning.w_meta,
            );
            effective_scores.push(EffectiveScore {
                window_id: window.id,
                system_id: system.id,
                criterion,
                effective_value,
                meta_score,
                max_event_score: max_vec.get(criterion),
            });
        }

        let meta_result = MetaResult {
            id: Uuid::new_v4(),
            window_id: window.id,
            system_id: system.id,
            meta_scores: response.meta_scores,
            summary: response.summary,
            findings: response.new_findings,
            recommended_action: response.recommended_action,
            key_event_ids: response.key_event_ids,
            created_at: now,
        };

        self.repos
            .meta
            .write_window_result(&meta_result, &effective_scores, &usage)
            .await?;
        self.metrics.record_window_analyzed();

        Ok(MetaOutcome {
            window_id: window.id,
            system_id: system.id,
            meta_result,
            effective_scores,
            resolved_indices: response.resolved_indices,
            open_findings_snapshot: open_findings,
        })
    }

    /// Fetches per-event scores in chunks of 100 event ids (spec §4.6 input
    /// assembly step 3), folding the results into one map.
    async fn fetch_scores_chunked(
        &self,
        event_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ScoreVector>, MetaError> {
        let mut map: HashMap<Uuid, ScoreVector> = HashMap::new();
        for chunk in event_ids.chunks(100) {
            let rows = self.repos.scores.fetch_for_events(chunk).await?;
            for (event_id, criterion, score) in rows {
                map.entry(event_id).or_insert(ScoreVector::ZERO).set(criterion, score);
            }
        }
        Ok(map)
    }
}

/// One template-deduplicated group as handed to the meta prompt, carrying
/// `{message, severity, occurrenceCount, scores}` per spec §4.6 step 4.
struct PromptGroup {
    message: String,
    severity: &'static str,
    occurrence_count: usize,
    scores: ScoreVector,
}

fn group_by_template(events: &[&Event], scores_by_event: &HashMap<Uuid, ScoreVector>) -> Vec<PromptGroup> {
    let owned: Vec<Event> = events.iter().map(|e| (*e).clone()).collect();
    let extracted = template::extract_templates(&owned, true);

    extracted
        .into_iter()
        .map(|group| {
            let mut vector = ScoreVector::ZERO;
            for event_id in &group.event_ids {
                if let Some(v) = scores_by_event.get(event_id) {
                    for (criterion, value) in v.iter() {
                        if value > vector.get(criterion) {
                            vector.set(criterion, value);
                        }
                    }
                }
            }
            let representative_severity = owned
                .iter()
                .find(|e| e.id == group.representative_event_id)
                .map(|e| e.severity.as_str())
                .unwrap_or("info");
            PromptGroup {
                message: group.representative_message,
                severity: representative_severity,
                occurrence_count: group.event_ids.len(),
                scores: vector,
            }
        })
        .collect()
}

fn build_prompt(
    system: &MonitoredSystem,
    source_labels: &[String],
    window: &Window,
    previous_summaries: &[(String, chrono::DateTime<Utc>)],
    open_findings: &[Finding],
    groups: &[PromptGroup],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "System: {} ({})\nSources: {}\nWindow: {} to {}\n\n",
        system.name,
        system.description,
        if source_labels.is_empty() { "(none)".to_string() } else { source_labels.join(", ") },
        window.from_ts.to_rfc3339(),
        window.to_ts.to_rfc3339(),
    ));

    prompt.push_str("Previous window summaries (oldest first):\n");
    if previous_summaries.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for (summary, created_at) in previous_summaries {
            prompt.push_str(&format!("- [{}] {}\n", created_at.to_rfc3339(), summary));
        }
    }

    prompt.push_str("\nCurrently open or acknowledged findings (indexed):\n");
    if open_findings.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for (i, finding) in open_findings.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. [{}] {}\n",
                i + 1,
                finding.severity.as_str(),
                finding.text
            ));
        }
    }

    prompt.push_str(&format!("\nEvent templates in this window ({}):\n", groups.len()));
    for (i, group) in groups.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] (x{}) {} scores={:?}\n",
            i + 1,
            group.severity,
            group.occurrence_count,
            group.message,
            group.scores.to_vec()
        ));
    }

    prompt
}

fn neutral_response() -> crate::domain::MetaAnalysisResponse {
    crate::domain::MetaAnalysisResponse {
        meta_scores: ScoreVector::ZERO,
        summary: "No scored events in this window; meta-analysis skipped.".to_string(),
        new_findings: Vec::new(),
        resolved_indices: Vec::new(),
        recommended_action: None,
        key_event_ids: Vec::new(),
    }
}

fn zero_usage(
    model: &str,
    system_id: Uuid,
    window_id: Uuid,
    event_count: usize,
    now: chrono::DateTime<Utc>,
) -> LlmUsage {
    LlmUsage {
        id: Uuid::new_v4(),
        run_type: RunType::Meta,
        model: model.to_string(),
        system_id,
        window_id: Some(window_id),
        event_count: event_count as i64,
        token_input: 0,
        token_output: 0,
        request_count: 0,
        cost_estimate: 0.0,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(message: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            system_id: Uuid::new_v4(),
            log_source_id: None,
            timestamp: Utc::now(),
            received_at: Utc::now(),
            message: message.to_string(),
            severity: crate::domain::EventSeverity::Info,
            host: None,
            source_ip: None,
            service: None,
            facility: None,
            program: None,
            trace_id: None,
            span_id: None,
            external_id: None,
            raw: serde_json::Value::Object(serde_json::Map::new()),
            normalized_hash: Uuid::new_v4().to_string(),
            acknowledged_at: None,
            scored_at: None,
        }
    }

    #[test]
    fn groups_fold_max_score_across_members() {
        let a = event("user 1 logged in");
        let b = event("user 2 logged in");
        let mut scores = HashMap::new();
        scores.insert(a.id, {
            let mut v = ScoreVector::ZERO;
            v.set(Criterion::Anomaly, 0.2);
            v
        });
        scores.insert(b.id, {
            let mut v = ScoreVector::ZERO;
            v.set(Criterion::Anomaly, 0.9);
            v
        });
        let refs = vec![&a, &b];
        let groups = group_by_template(&refs, &scores);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].occurrence_count, 2);
        assert!((groups[0].scores.get(Criterion::Anomaly) - 0.9).abs() < 1e-9);
    }
}
