//! Per-event scorer (spec §4.4): turns unscored events into six-criterion
//! score vectors via template dedup plus a batched LLM call, token-optimised
//! so cost scales with distinct message patterns rather than raw volume.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use regex::RegexBuilder;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::TuningConfig;
use crate::domain::{
    Event, EventSeverity, MessageTemplate, MonitoredSystem, NormalBehaviorTemplate, ScoreVector,
};
use crate::error::ScoringError;
use crate::llm::{LlmClient, PromptSet};
use crate::metrics::PipelineMetrics;
use crate::repository::Repositories;
use crate::template::{self, ExtractedTemplate};

/// Compiled form of a [`NormalBehaviorTemplate`]; invalid regexes in any
/// field drop the whole rule rather than matching everything.
struct CompiledNormalBehavior {
    message: regex::Regex,
    host: Option<regex::Regex>,
    program: Option<regex::Regex>,
}

fn compile_case_insensitive(pattern: &str) -> Option<regex::Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

fn compile_normal_behavior(templates: &[NormalBehaviorTemplate]) -> Vec<CompiledNormalBehavior> {
    templates
        .iter()
        .filter_map(|t| {
            let message = match compile_case_insensitive(&t.message_pattern) {
                Some(re) => re,
                None => {
                    warn!(template_id = %t.id, "invalid normal-behavior message_pattern, skipping");
                    return None;
                }
            };
            let host = match t.host_pattern.as_deref() {
                Some(p) => match compile_case_insensitive(p) {
                    Some(re) => Some(re),
                    None => {
                        warn!(template_id = %t.id, "invalid normal-behavior host_pattern, skipping rule");
                        return None;
                    }
                },
                None => None,
            };
            let program = match t.program_pattern.as_deref() {
                Some(p) => match compile_case_insensitive(p) {
                    Some(re) => Some(re),
                    None => {
                        warn!(template_id = %t.id, "invalid normal-behavior program_pattern, skipping rule");
                        return None;
                    }
                },
                None => None,
            };
            Some(CompiledNormalBehavior { message, host, program })
        })
        .collect()
}

fn matches_normal_behavior(event: &Event, rules: &[CompiledNormalBehavior]) -> bool {
    rules.iter().any(|rule| {
        rule.message.is_match(&event.message)
            && rule
                .host
                .as_ref()
                .map(|re| event.host.as_deref().is_some_and(|h| re.is_match(h)))
                .unwrap_or(true)
            && rule
                .program
                .as_ref()
                .map(|re| event.program.as_deref().is_some_and(|p| re.is_match(p)))
                .unwrap_or(true)
    })
}

/// What a template's score vector should become for this tick, and whether
/// the template cache needs updating as a result.
enum Resolution {
    /// Reused verbatim from `cached_scores`; cache stays untouched.
    CacheHit(ScoreVector),
    /// Freshly determined this tick (severity skip, low-score skip, or LLM);
    /// the template's running average needs folding.
    Fresh(ScoreVector),
}

pub struct EventScorer {
    repos: Repositories,
    llm: Arc<LlmClient>,
    prompts: PromptSet,
    metrics: Arc<PipelineMetrics>,
}

impl EventScorer {
    pub fn new(
        repos: Repositories,
        llm: Arc<LlmClient>,
        prompts: PromptSet,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { repos, llm, prompts, metrics }
    }

    /// Runs one scoring pass across every given system, stopping early once
    /// `max_duration` has elapsed since `started` (spec §4.4's `MAX_SCORING_JOB_MS`
    /// soft deadline). Returns the number of events marked scored.
    #[instrument(skip(self, systems, tuning))]
    pub async fn run(
        &self,
        systems: &[MonitoredSystem],
        tuning: &TuningConfig,
        started: Instant,
        max_duration: std::time::Duration,
    ) -> Result<usize, ScoringError> {
        let mut processed = 0usize;
        for system in systems {
            if started.elapsed() >= max_duration {
                return Err(ScoringError::DeadlineExceeded { processed });
            }
            processed += self
                .run_for_system(system, tuning, started, max_duration)
                .await?;
        }
        self.metrics.record_scoring_run();
        Ok(processed)
    }

    async fn run_for_system(
        &self,
        system: &MonitoredSystem,
        tuning: &TuningConfig,
        started: Instant,
        max_duration: std::time::Duration,
    ) -> Result<usize, ScoringError> {
        let normal_behavior = self.repos.normal_behavior.enabled_for_system(system.id).await?;
        let compiled_normal_behavior = compile_normal_behavior(&normal_behavior);

        let mut processed = 0usize;
        loop {
            if started.elapsed() >= max_duration {
                return Err(ScoringError::DeadlineExceeded { processed });
            }

            let batch = self
                .repos
                .events
                .fetch_unscored(system.id, tuning.scoring_chunk_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            // "not acknowledged" (spec §4.4 step 1) is enforced by
            // `fetch_unscored`'s WHERE clause, so every fetched event is
            // fair game for this tick's work.
            let batch_len = batch.len();
            let mut remaining: Vec<Event> = batch;

            let mut scored_event_ids: Vec<Uuid> = Vec::new();
            let mut per_event_scores: Vec<(Uuid, ScoreVector)> = Vec::new();

            // Step 2/3: normal-behaviour exclusion and orphan fragments both
            // get a zero vector and an immediate scored stamp, skipping the
            // template pipeline entirely.
            remaining.retain(|event| {
                let excluded = matches_normal_behavior(event, &compiled_normal_behavior)
                    || template::is_orphan_fragment(&event.message);
                if excluded {
                    scored_event_ids.push(event.id);
                }
                !excluded
            });

            let groups = template::extract_templates(&remaining, true);
            let events_by_id: HashMap<Uuid, &Event> =
                remaining.iter().map(|e| (e.id, e)).collect();

            let mut llm_queue: Vec<(MessageTemplate, ExtractedTemplate)> = Vec::new();
            let mut resolved: Vec<(MessageTemplate, ExtractedTemplate, Resolution)> = Vec::new();

            for group in groups {
                let template = self.load_or_create_template(system.id, &group).await?;
                let representative_severity = events_by_id
                    .get(&group.representative_event_id)
                    .map(|e| e.severity)
                    .unwrap_or(EventSeverity::Info);

                if tuning.severity_skip_enabled
                    && tuning
                        .severity_skip_set
                        .iter()
                        .any(|s| s.eq_ignore_ascii_case(representative_severity.as_str()))
                {
                    let vector = ScoreVector::from_raw(&[tuning.severity_skip_default_value; 6]);
                    resolved.push((template, group, Resolution::Fresh(vector)));
                    continue;
                }

                if template.is_cache_fresh(Utc::now(), tuning.score_cache_ttl_minutes) {
                    if let Some(cached) = template.cached_scores {
                        resolved.push((template, group, Resolution::CacheHit(cached)));
                        continue;
                    }
                }

                if template.is_low_score_stable(tuning.low_score_min_scorings, tuning.low_score_threshold)
                {
                    resolved.push((template, group, Resolution::Fresh(ScoreVector::ZERO)));
                    continue;
                }

                llm_queue.push((template, group));
            }

            let llm_resolved = self
                .score_via_llm(system, &llm_queue, tuning)
                .await;
            for ((template, group), vector) in llm_queue.into_iter().zip(llm_resolved.into_iter())
            {
                resolved.push((template, group, Resolution::Fresh(vector)));
            }

            let mut cache_updates: Vec<(Uuid, ScoreVector, chrono::DateTime<Utc>, f64, i64)> =
                Vec::new();
            let now = Utc::now();

            for (mut template, group, resolution) in resolved {
                let vector = match resolution {
                    Resolution::CacheHit(v) => v,
                    Resolution::Fresh(v) => {
                        template.fold_new_max_score(v.max());
                        cache_updates.push((
                            template.id,
                            v,
                            now,
                            template.avg_max_score,
                            template.score_count,
                        ));
                        v
                    }
                };
                for event_id in &group.event_ids {
                    per_event_scores.push((*event_id, vector));
                    scored_event_ids.push(*event_id);
                }
            }

            self.repos.templates.record_scored_bulk(&cache_updates).await?;
            self.finish_chunk(&scored_event_ids, &per_event_scores).await?;
            processed += batch_len;

            if batch_len < tuning.scoring_chunk_size as usize {
                break;
            }
        }

        Ok(processed)
    }

    async fn load_or_create_template(
        &self,
        system_id: Uuid,
        group: &ExtractedTemplate,
    ) -> Result<MessageTemplate, ScoringError> {
        if let Some(existing) = self
            .repos
            .templates
            .find_by_hash(system_id, &group.pattern_hash)
            .await?
        {
            let delta = group.event_ids.len() as i64;
            self.repos
                .templates
                .bulk_touch(&[(existing.id, delta, Utc::now())])
                .await?;
            return Ok(existing);
        }

        let mut fresh = MessageTemplate::new(
            system_id,
            group.canonical_text.clone(),
            group.pattern_hash.clone(),
            Utc::now(),
        );
        fresh.occurrence_count = group.event_ids.len() as i64;
        let inserted = self.repos.templates.upsert_new(&fresh).await?;
        self.metrics.record_template_created();
        Ok(inserted)
    }

    /// Calls the LLM in `scoring_batch_size` chunks, one template-representative
    /// message per slot, truncated to `message_max_length`. A batch whose LLM
    /// call or parse fails falls back to zero vectors for that batch only
    /// (spec §4.4: "per-batch LLM error is isolated").
    async fn score_via_llm(
        &self,
        system: &MonitoredSystem,
        queue: &[(MessageTemplate, ExtractedTemplate)],
        tuning: &TuningConfig,
    ) -> Vec<ScoreVector> {
        if queue.is_empty() {
            return Vec::new();
        }

        let batch_size = tuning.scoring_batch_size.clamp(1, 100) as usize;
        let mut out = Vec::with_capacity(queue.len());

        for chunk in queue.chunks(batch_size) {
            let user_prompt = self.build_scoring_prompt(system, chunk, tuning.message_max_length);
            match self
                .llm
                .chat_json(&self.prompts.scoring_system_prompt, &user_prompt)
                .await
            {
                Ok(completion) => {
                    self.metrics.record_llm_call(true);
                    let vectors =
                        crate::llm::parsing::parse_scoring_response(&completion.content, chunk.len());
                    out.extend(vectors);
                }
                Err(e) => {
                    warn!(error = %e, system_id = %system.id, "scoring LLM call failed, zeroing batch");
                    self.metrics.record_llm_call(false);
                    out.extend(std::iter::repeat(ScoreVector::ZERO).take(chunk.len()));
                }
            }
        }

        out
    }

    fn build_scoring_prompt(
        &self,
        system: &MonitoredSystem,
        chunk: &[(MessageTemplate, ExtractedTemplate)],
        message_max_length: usize,
    ) -> String {
        let mut prompt = format!(
            "System: {} ({})\nScore each of the following {} log message templates:\n",
            system.name,
            system.description,
            chunk.len()
        );
        for (i, (_, group)) in chunk.iter().enumerate() {
            let truncated: String = group
                .representative_message
                .chars()
                .take(message_max_length)
                .collect();
            prompt.push_str(&format!("{}. {}\n", i + 1, truncated));
        }
        prompt
    }

    /// Writes non-zero per-event score rows and stamps every processed event
    /// as scored (I2's authoritative marker), regardless of which strategy
    /// produced its vector.
    async fn finish_chunk(
        &self,
        scored_event_ids: &[Uuid],
        per_event_scores: &[(Uuid, ScoreVector)],
    ) -> Result<(), ScoringError> {
        self.repos.scores.insert_non_zero(per_event_scores).await?;
        self.repos
            .events
            .mark_scored(scored_event_ids, Utc::now())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn event(message: &str, severity: EventSeverity) -> Event {
        Event {
            id: Uuid::new_v4(),
            system_id: Uuid::new_v4(),
            log_source_id: None,
            timestamp: Utc::now(),
            received_at: Utc::now(),
            message: message.to_string(),
            severity,
            host: Some("host-1".to_string()),
            source_ip: None,
            service: None,
            facility: None,
            program: Some("sshd".to_string()),
            trace_id: None,
            span_id: None,
            external_id: None,
            raw: Value::Object(Map::new()),
            normalized_hash: Uuid::new_v4().to_string(),
            acknowledged_at: None,
            scored_at: None,
        }
    }

    fn normal_behavior(message_pattern: &str, program_pattern: Option<&str>) -> NormalBehaviorTemplate {
        NormalBehaviorTemplate {
            id: Uuid::new_v4(),
            system_id: Uuid::new_v4(),
            message_pattern: message_pattern.to_string(),
            host_pattern: None,
            program_pattern: program_pattern.map(|s| s.to_string()),
            enabled: true,
        }
    }

    #[test]
    fn normal_behavior_match_requires_all_present_fields() {
        let rules = compile_normal_behavior(&[normal_behavior(
            "^healthcheck ok$",
            Some("^sshd$"),
        )]);
        let matching = event("healthcheck ok", EventSeverity::Info);
        assert!(matches_normal_behavior(&matching, &rules));

        let mut wrong_program = matching.clone();
        wrong_program.program = Some("cron".to_string());
        assert!(!matches_normal_behavior(&wrong_program, &rules));
    }

    #[test]
    fn invalid_regex_drops_the_rule_rather_than_matching_everything() {
        let rules = compile_normal_behavior(&[normal_behavior("(unclosed", None)]);
        assert!(rules.is_empty());
        let anything = event("anything at all", EventSeverity::Info);
        assert!(!matches_normal_behavior(&anything, &rules));
    }
}
