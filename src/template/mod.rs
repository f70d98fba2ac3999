//! Template extraction and dedup (spec §4.3): collapses near-identical
//! messages so downstream LLM work scales with pattern count, not event
//! count.

pub mod canonical;

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::domain::Event;

/// One distinct canonical pattern seen within a batch of events, grouped by
/// `pattern_hash`. Carries every event id that produced this pattern so the
/// scorer can fan a single score vector back out to all of them.
#[derive(Debug, Clone)]
pub struct ExtractedTemplate {
    pub pattern_hash: String,
    pub canonical_text: String,
    pub representative_event_id: Uuid,
    pub representative_message: String,
    pub event_ids: Vec<Uuid>,
}

/// Groups `events` by canonical-form hash, preserving first-seen order for
/// representative choice. Order of the input batch does not affect which
/// groups come out, only which event within a group becomes the
/// representative (spec L2: stable *set* of groups under permutation).
pub fn extract_templates(events: &[Event], normalize_sql_literals: bool) -> Vec<ExtractedTemplate> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, ExtractedTemplate> = HashMap::new();

    for event in events {
        let canonical_text = canonical::canonicalize(&event.message, normalize_sql_literals);
        let pattern_hash = canonical::pattern_hash(&canonical_text);

        match groups.get_mut(&pattern_hash) {
            Some(group) => group.event_ids.push(event.id),
            None => {
                order.push(pattern_hash.clone());
                groups.insert(
                    pattern_hash.clone(),
                    ExtractedTemplate {
                        pattern_hash,
                        canonical_text,
                        representative_event_id: event.id,
                        representative_message: event.message.clone(),
                        event_ids: vec![event.id],
                    },
                );
            }
        }
    }

    order.into_iter().filter_map(|hash| groups.remove(&hash)).collect()
}

fn sql_keyword_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(select|insert|update|delete|from|where|and|or|values|set|join)\b")
            .unwrap()
    })
}

fn process_line_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*process\s+\d+\b").unwrap())
}

/// Messages shorter than 120 chars that look like multiline leftovers
/// (bare SQL continuation fragments, `Process NNN` lines, or unstripped
/// `#011`/tab markers) bypass the LLM entirely (spec §4.3).
pub fn is_orphan_fragment(message: &str) -> bool {
    if message.chars().count() >= 120 {
        return false;
    }
    sql_keyword_start().is_match(message)
        || process_line_start().is_match(message)
        || message.starts_with("#011")
        || message.starts_with('\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Map, Value};

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
            raw: Value::Object(Map::new()),
            normalized_hash: Uuid::new_v4().to_string(),
            acknowledged_at: None,
            scored_at: None,
        }
    }

    #[test]
    fn groups_events_sharing_a_canonical_form() {
        let events = vec![
            event("user 1 logged in"),
            event("user 2 logged in"),
            event("disk full on /var"),
        ];
        let templates = extract_templates(&events, false);
        assert_eq!(templates.len(), 2);
        let login_group = templates
            .iter()
            .find(|t| t.canonical_text.contains("logged in"))
            .unwrap();
        assert_eq!(login_group.event_ids.len(), 2);
    }

    #[test]
    fn group_set_is_stable_under_permutation() {
        let a = event("user 1 logged in");
        let b = event("user 2 logged in");
        let c = event("disk full on /var");

        let forward = extract_templates(&[a.clone(), b.clone(), c.clone()], false);
        let shuffled = extract_templates(&[c, b, a], false);

        let mut forward_hashes: Vec<&str> =
            forward.iter().map(|t| t.pattern_hash.as_str()).collect();
        let mut shuffled_hashes: Vec<&str> =
            shuffled.iter().map(|t| t.pattern_hash.as_str()).collect();
        forward_hashes.sort();
        shuffled_hashes.sort();
        assert_eq!(forward_hashes, shuffled_hashes);
    }

    #[test]
    fn short_sql_fragment_is_orphan() {
        assert!(is_orphan_fragment("where id = 1"));
        assert!(!is_orphan_fragment("a perfectly normal short message"));
    }

    #[test]
    fn process_line_is_orphan() {
        assert!(is_orphan_fragment("Process 4821 exited"));
    }

    #[test]
    fn long_sql_looking_text_is_not_orphan() {
        let long = format!("select {}", "x".repeat(200));
        assert!(!is_orphan_fragment(&long));
    }
}
