//! The two canonical system prompts (spec §6.3), overridable via config.

pub const DEFAULT_SCORING_SYSTEM_PROMPT: &str = "You are a log risk scoring engine. \
Given a batch of log message templates, return strict JSON: \
{\"scores\": [{\"it_security\": 0.0, \"performance_degradation\": 0.0, \"failure_prediction\": 0.0, \
\"anomaly\": 0.0, \"compliance_audit\": 0.0, \"operational_risk\": 0.0}]}, \
one element per input template in the same order, all floats in [0,1]. \
Respond with JSON only, no prose.";

pub const DEFAULT_META_SYSTEM_PROMPT: &str = "You are a log risk meta-analysis engine. \
Given the system specification, previous window summaries, currently-open findings indexed \
1..N, and the current window's events grouped by template with their scores, return strict \
JSON: {\"meta_scores\": {...six criteria...}, \"summary\": \"2-4 sentences\", \
\"new_findings\": [{\"text\": \"...\", \"severity\": \"critical|high|medium|low|info\", \
\"criterion_slug\": \"...\"}], \"resolved_indices\": [1-based ints into the open findings list], \
\"recommended_action\": \"...\", \"key_event_ids\": [\"uuid\"...]}. Respond with JSON only.";

#[derive(Debug, Clone)]
pub struct PromptSet {
    pub scoring_system_prompt: String,
    pub meta_system_prompt: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            scoring_system_prompt: DEFAULT_SCORING_SYSTEM_PROMPT.to_string(),
            meta_system_prompt: DEFAULT_META_SYSTEM_PROMPT.to_string(),
        }
    }
}
