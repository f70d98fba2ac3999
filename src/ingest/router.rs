//! Assigns each normalised event to exactly one `(system, log_source)`
//! (invariant I1) using a process-local, atomically-swapped regex cache.

use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Event, LogSource, SelectorField};
use crate::error::RouterError;

struct CompiledSource {
    system_id: Uuid,
    log_source_id: Uuid,
    patterns: Vec<(SelectorField, Regex)>,
}

/// An immutable snapshot of active, compiled log sources ordered
/// `(system_id, priority asc, id asc)`. CRUD on sources invalidates this by
/// swapping in a new snapshot, never mutating in place.
pub struct RouterSnapshot {
    sources: Vec<CompiledSource>,
}

impl RouterSnapshot {
    pub fn compile(mut sources: Vec<LogSource>) -> Result<Self, RouterError> {
        sources.sort_by(|a, b| a.system_id.cmp(&b.system_id).then(a.priority.cmp(&b.priority)).then(a.id.cmp(&b.id)));

        let compiled = sources
            .into_iter()
            .map(|source| {
                let mut patterns = Vec::with_capacity(source.selector.len());
                for (field, pattern) in &source.selector {
                    let regex = Regex::new(&format!("(?i){pattern}")).map_err(|e| {
                        RouterError::InvalidSelector {
                            source_id: source.id.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    patterns.push((*field, regex));
                }
                Ok(CompiledSource {
                    system_id: source.system_id,
                    log_source_id: source.id,
                    patterns,
                })
            })
            .collect::<Result<Vec<_>, RouterError>>()?;

        Ok(Self { sources: compiled })
    }

    fn field_value<'a>(event: &'a Event, field: SelectorField) -> Option<&'a str> {
        match field {
            SelectorField::Host => event.host.as_deref(),
            SelectorField::SourceIp => event.source_ip.as_deref(),
            SelectorField::Program => event.program.as_deref(),
            SelectorField::Service => event.service.as_deref(),
            SelectorField::Facility => event.facility.as_deref(),
        }
    }

    /// First matching source wins. A source matches iff every selector field
    /// is present, non-empty, and matches its compiled regex.
    pub fn route(&self, event: &Event) -> Result<(Uuid, Uuid), RouterError> {
        'sources: for source in &self.sources {
            for (field, regex) in &source.patterns {
                match Self::field_value(event, *field) {
                    Some(value) if !value.is_empty() && regex.is_match(value) => continue,
                    _ => continue 'sources,
                }
            }
            return Ok((source.system_id, source.log_source_id));
        }
        Err(RouterError::NoMatch)
    }
}

/// Holds the current [`RouterSnapshot`] behind a lock readers hold only
/// long enough to clone the `Arc`; rebuild-then-swap is the only write path
/// (spec §5: "source-router cache is a process-local immutable snapshot;
/// CRUD invalidates it atomically").
#[derive(Clone)]
pub struct SourceRouter {
    snapshot: Arc<RwLock<Arc<RouterSnapshot>>>,
}

impl SourceRouter {
    pub fn new(initial: RouterSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub fn swap(&self, next: RouterSnapshot) {
        *self.snapshot.write() = Arc::new(next);
    }

    pub fn route(&self, event: &Event) -> Result<(Uuid, Uuid), RouterError> {
        let snapshot = self.snapshot.read().clone();
        snapshot.route(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn log_source(system_id: Uuid, priority: i32, selector: Vec<(SelectorField, &str)>) -> LogSource {
        LogSource {
            id: Uuid::new_v4(),
            system_id,
            label: "test".to_string(),
            selector: selector.into_iter().map(|(f, p)| (f, p.to_string())).collect(),
            priority,
            active: true,
        }
    }

    fn event(host: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            system_id: Uuid::nil(),
            log_source_id: None,
            timestamp: Utc::now(),
            received_at: Utc::now(),
            message: "m".to_string(),
            severity: crate::domain::EventSeverity::Info,
            host: Some(host.to_string()),
            source_ip: None,
            service: None,
            facility: None,
            program: None,
            trace_id: None,
            span_id: None,
            external_id: None,
            raw: serde_json::Value::Object(serde_json::Map::new()),
            normalized_hash: "h".to_string(),
            acknowledged_at: None,
            scored_at: None,
        }
    }

    #[test]
    fn lower_priority_number_wins_first() {
        let system_id = Uuid::new_v4();
        let low_priority = log_source(system_id, 0, vec![(SelectorField::Host, "^web-")]);
        let high_priority = log_source(system_id, 10, vec![(SelectorField::Host, "^web-")]);
        let expected_source_id = low_priority.id;

        let snapshot = RouterSnapshot::compile(vec![high_priority, low_priority]).unwrap();
        let (_, matched_source) = snapshot.route(&event("web-01")).unwrap();
        assert_eq!(matched_source, expected_source_id);
    }

    #[test]
    fn unmatched_event_errors() {
        let source = log_source(Uuid::new_v4(), 0, vec![(SelectorField::Host, "^db-")]);
        let snapshot = RouterSnapshot::compile(vec![source]).unwrap();
        assert!(matches!(snapshot.route(&event("web-01")), Err(RouterError::NoMatch)));
    }

    #[test]
    fn missing_selector_field_does_not_match() {
        let source = log_source(Uuid::new_v4(), 0, vec![(SelectorField::Program, "nginx")]);
        let snapshot = RouterSnapshot::compile(vec![source]).unwrap();
        assert!(matches!(snapshot.route(&event("web-01")), Err(RouterError::NoMatch)));
    }
}
