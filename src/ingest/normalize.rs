//! Turns heterogeneous raw records (syslog-style, GELF-style, flat key-value
//! JSON) into canonical [`Event`]s.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{Event, EventSeverity};
use crate::error::IngestError;

const MESSAGE_FIELDS: [&str; 3] = ["message", "short_message", "msg"];
const KNOWN_FIELDS: [&str; 17] = [
    "message",
    "short_message",
    "msg",
    "timestamp",
    "time",
    "ts",
    "severity",
    "level",
    "host",
    "source_ip",
    "service",
    "facility",
    "program",
    "trace_id",
    "span_id",
    "external_id",
    "id",
];

/// Severity-upgrade rules, most severe first. Content evidence only ever
/// raises severity above the parsed header value, never lowers it.
const ENRICHMENT_RULES: &[(&str, EventSeverity)] = &[
    ("kernel panic", EventSeverity::Emergency),
    ("panic", EventSeverity::Critical),
    ("out of memory", EventSeverity::Critical),
    ("segfault", EventSeverity::Critical),
    ("level=error", EventSeverity::Error),
    ("error:", EventSeverity::Error),
    ("deprecated", EventSeverity::Warning),
];

fn resolve_message(record: &Map<String, Value>) -> Option<String> {
    resolve_message_field(record)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

/// Reads whichever of `{message, short_message, msg}` is present, untrimmed.
/// Exposed for the multiline reassembler, which needs to detect and rewrite
/// continuation markers before the stricter normalisation pass runs.
pub fn resolve_message_field(record: &Map<String, Value>) -> Option<String> {
    for field in MESSAGE_FIELDS {
        if let Some(value) = record.get(field).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    None
}

/// Heuristic epoch classification by magnitude, per spec §4.1 rule 2.
fn classify_epoch(n: f64) -> DateTime<Utc> {
    let secs = if n > 1e18 {
        n / 1e9
    } else if n > 1e15 {
        n / 1e6
    } else if n > 1e12 {
        n / 1e3
    } else {
        n
    };
    Utc.timestamp_opt(secs as i64, 0).single().unwrap_or_else(Utc::now)
}

fn resolve_timestamp(record: &Map<String, Value>, now: DateTime<Utc>) -> (DateTime<Utc>, Option<IngestError>) {
    for field in ["timestamp", "time", "ts"] {
        match record.get(field) {
            Some(Value::String(s)) => {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                    return (parsed.with_timezone(&Utc), None);
                }
                return (
                    now,
                    Some(IngestError::TimestampUnparseable(s.clone())),
                );
            }
            Some(Value::Number(n)) => {
                if let Some(f) = n.as_f64() {
                    return (classify_epoch(f), None);
                }
            }
            _ => continue,
        }
    }
    (now, None)
}

fn resolve_severity(record: &Map<String, Value>) -> Option<EventSeverity> {
    for field in ["severity", "level"] {
        match record.get(field) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    if let Some(s) = EventSeverity::from_numeric(i) {
                        return Some(s);
                    }
                }
            }
            Some(Value::String(s)) => {
                if let Some(sev) = EventSeverity::from_name(s) {
                    return Some(sev);
                }
            }
            _ => continue,
        }
    }
    None
}

/// Never downgrades: only raises severity when message-body evidence is
/// stronger than what the header already claims (spec §4.1 rule 4).
fn enrich_severity(header: EventSeverity, message: &str) -> EventSeverity {
    let lower = message.to_ascii_lowercase();
    let mut best = header;
    for (needle, implied) in ENRICHMENT_RULES {
        if lower.contains(needle) && *implied > best {
            best = *implied;
        }
    }
    best
}

fn apply_timezone_offset(ts: DateTime<Utc>, offset_minutes: i32) -> DateTime<Utc> {
    ts - Duration::minutes(offset_minutes as i64)
}

/// Normalises one raw record into an [`Event`]. Returns `Ok(None)` for
/// entries silently dropped (empty message) rather than an error, matching
/// the ingest contract's "invalid entries are dropped silently".
pub fn normalize_record(
    record: &Map<String, Value>,
    system_id: Uuid,
    timezone_offset_minutes: i32,
    now: DateTime<Utc>,
) -> Result<Option<Event>, IngestError> {
    let message = match resolve_message(record) {
        Some(m) => m,
        None => return Ok(None),
    };

    let (timestamp, timestamp_warning) = resolve_timestamp(record, now);
    let timestamp = apply_timezone_offset(timestamp, timezone_offset_minutes);

    let header_severity = resolve_severity(record).unwrap_or(EventSeverity::Info);
    let severity = enrich_severity(header_severity, &message);

    let host = record.get("host").and_then(Value::as_str).map(String::from);
    let source_ip = record
        .get("source_ip")
        .and_then(Value::as_str)
        .map(String::from);
    let service = record
        .get("service")
        .and_then(Value::as_str)
        .map(String::from);
    let facility = record
        .get("facility")
        .and_then(Value::as_str)
        .map(String::from);
    let program = record
        .get("program")
        .and_then(Value::as_str)
        .map(String::from);
    let trace_id = record
        .get("trace_id")
        .and_then(Value::as_str)
        .map(String::from);
    let span_id = record
        .get("span_id")
        .and_then(Value::as_str)
        .map(String::from);
    let external_id = record
        .get("external_id")
        .or_else(|| record.get("id"))
        .and_then(Value::as_str)
        .map(String::from);

    // Unknown fields feed `raw`; a connector-provided `raw` object is merged
    // in on top so it wins on key conflict.
    let mut raw = Map::new();
    for (key, value) in record.iter() {
        if !KNOWN_FIELDS.contains(&key.as_str()) && key != "raw" {
            raw.insert(key.clone(), value.clone());
        }
    }
    if let Some(Value::Object(connector_raw)) = record.get("raw") {
        for (key, value) in connector_raw.iter() {
            raw.insert(key.clone(), value.clone());
        }
    }

    let normalized_hash = Event::compute_normalized_hash(
        timestamp,
        &message,
        host.as_deref(),
        source_ip.as_deref(),
        service.as_deref(),
        program.as_deref(),
        facility.as_deref(),
    );

    let event = Event {
        id: Uuid::new_v4(),
        system_id,
        log_source_id: None,
        timestamp,
        received_at: now,
        message,
        severity,
        host,
        source_ip,
        service,
        facility,
        program,
        trace_id,
        span_id,
        external_id,
        raw: Value::Object(raw),
        normalized_hash,
        acknowledged_at: None,
        scored_at: None,
    };

    if let Some(warning) = timestamp_warning {
        tracing::debug!(error = %warning, "timestamp fell back to now");
    }

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn drops_entry_with_empty_message() {
        let r = record(json!({"message": "   "}));
        let result = normalize_record(&r, Uuid::new_v4(), 0, Utc::now()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn resolves_message_from_alias_fields() {
        let r = record(json!({"short_message": "disk full"}));
        let event = normalize_record(&r, Uuid::new_v4(), 0, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(event.message, "disk full");
    }

    #[test]
    fn severity_enrichment_upgrades_but_never_downgrades() {
        let r = record(json!({"message": "kernel panic detected", "severity": "info"}));
        let event = normalize_record(&r, Uuid::new_v4(), 0, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(event.severity, EventSeverity::Emergency);

        let r2 = record(json!({"message": "all fine", "severity": "critical"}));
        let event2 = normalize_record(&r2, Uuid::new_v4(), 0, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(event2.severity, EventSeverity::Critical);
    }

    #[test]
    fn classifies_epoch_magnitude_correctly() {
        let ns = 1_700_000_000_000_000_000.0_f64;
        let ts = classify_epoch(ns);
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn unknown_fields_collect_into_raw() {
        let r = record(json!({"message": "m", "custom_field": "x"}));
        let event = normalize_record(&r, Uuid::new_v4(), 0, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(event.raw["custom_field"], json!("x"));
    }

    #[test]
    fn typed_fields_are_not_duplicated_into_raw() {
        let r = record(json!({
            "message": "m",
            "program": "sshd",
            "trace_id": "t1",
            "span_id": "s1",
            "external_id": "e1",
            "custom_field": "x"
        }));
        let event = normalize_record(&r, Uuid::new_v4(), 0, Utc::now())
            .unwrap()
            .unwrap();
        assert!(event.raw.get("program").is_none());
        assert!(event.raw.get("trace_id").is_none());
        assert!(event.raw.get("span_id").is_none());
        assert!(event.raw.get("external_id").is_none());
        assert_eq!(event.raw["custom_field"], json!("x"));
    }

    #[test]
    fn connector_raw_wins_on_key_conflict() {
        let r = record(json!({
            "message": "m",
            "custom_field": "from_top_level",
            "raw": {"custom_field": "from_connector"}
        }));
        let event = normalize_record(&r, Uuid::new_v4(), 0, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(event.raw["custom_field"], json!("from_connector"));
    }

    #[test]
    fn timezone_offset_is_subtracted() {
        let r = record(json!({"message": "m", "timestamp": "2024-01-01T12:00:00Z"}));
        let event = normalize_record(&r, Uuid::new_v4(), 60, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(event.timestamp.to_rfc3339(), "2024-01-01T11:00:00+00:00");
    }
}
