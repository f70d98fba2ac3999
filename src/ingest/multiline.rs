//! Reassembles PostgreSQL-style multiline continuations before normalisation.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::normalize::resolve_message_field;

fn continuation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+)-(\d+)\]\s?(.*)$").unwrap())
}

fn decode_escapes(body: &str) -> String {
    body.replace("#011", "\t").replace("#012", "\n")
}

struct Continuation {
    session_line: u64,
    index: u64,
    body: String,
}

fn parse_continuation(message: &str) -> Option<Continuation> {
    let caps = continuation_regex().captures(message)?;
    Some(Continuation {
        session_line: caps.get(1)?.as_str().parse().ok()?,
        index: caps.get(2)?.as_str().parse().ok()?,
        body: decode_escapes(caps.get(3)?.as_str()),
    })
}

fn field_str(record: &Map<String, Value>, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(String::from)
}

/// Merges consecutive records sharing `(host, program, session_line)` with
/// strictly sequential continuation indices starting at 1. Orphan
/// continuations (a `K > 1` never preceded by its head) pass through with
/// the marker stripped rather than being dropped.
pub fn reassemble_multiline(records: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    let mut out: Vec<Map<String, Value>> = Vec::with_capacity(records.len());
    // (host, program, session_line) -> (index into `out`, next expected K)
    let mut open: std::collections::HashMap<(Option<String>, Option<String>, u64), (usize, u64)> =
        std::collections::HashMap::new();

    for record in records {
        let message = match resolve_message_field(&record) {
            Some(m) => m,
            None => {
                out.push(record);
                continue;
            }
        };

        let continuation = match parse_continuation(&message) {
            Some(c) => c,
            None => {
                out.push(record);
                continue;
            }
        };

        let host = field_str(&record, "host");
        let program = field_str(&record, "program");
        let key = (host.clone(), program.clone(), continuation.session_line);

        if continuation.index == 1 {
            let mut merged = record.clone();
            set_message_field(&mut merged, &continuation.body);
            out.push(merged);
            open.insert(key, (out.len() - 1, 2));
            continue;
        }

        match open.get(&key) {
            Some(&(out_index, expected)) if expected == continuation.index => {
                if let Some(existing) = resolve_message_field(&out[out_index]) {
                    let joined = format!("{existing}\n{}", continuation.body);
                    set_message_field(&mut out[out_index], &joined);
                }
                open.insert(key, (out_index, continuation.index + 1));
            }
            _ => {
                // Orphan continuation: pass through with the marker stripped.
                let mut passthrough = record.clone();
                set_message_field(&mut passthrough, &continuation.body);
                out.push(passthrough);
            }
        }
    }

    out
}

fn set_message_field(record: &mut Map<String, Value>, body: &str) {
    for field in ["message", "short_message", "msg"] {
        if record.contains_key(field) {
            record.insert(field.to_string(), Value::String(body.to_string()));
            return;
        }
    }
    record.insert("message".to_string(), Value::String(body.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn merges_sequential_continuations() {
        let records = vec![
            rec(json!({"message": "[42-1] statement: select", "host": "a", "program": "postgres"})),
            rec(json!({"message": "[42-2] from users", "host": "a", "program": "postgres"})),
            rec(json!({"message": "[42-3] where id = 1", "host": "a", "program": "postgres"})),
        ];
        let merged = reassemble_multiline(records);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0]["message"],
            json!("statement: select\nfrom users\nwhere id = 1")
        );
    }

    #[test]
    fn orphan_continuation_passes_through_stripped() {
        let records = vec![rec(
            json!({"message": "[7-3] trailing fragment", "host": "a", "program": "postgres"}),
        )];
        let merged = reassemble_multiline(records);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["message"], json!("trailing fragment"));
    }

    #[test]
    fn decodes_tab_and_newline_escapes() {
        let records = vec![rec(
            json!({"message": "[1-1] a#011b#012c", "host": "a", "program": "p"}),
        )];
        let merged = reassemble_multiline(records);
        assert_eq!(merged[0]["message"], json!("a\tb\nc"));
    }

    #[test]
    fn non_continuation_messages_pass_through_untouched() {
        let records = vec![rec(json!({"message": "plain message"}))];
        let merged = reassemble_multiline(records);
        assert_eq!(merged[0]["message"], json!("plain message"));
    }
}
