//! Robust parsing of LLM oracle responses (spec §4.4, §4.6, §6.2).
//!
//! Tolerates empty content, malformed JSON, truncated arrays, and extra
//! fields; never panics on attacker- or model-controlled input.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Criterion, FindingSeverity, MetaAnalysisResponse, RawFinding, ScoreVector};

const SCORE_FIELD_ORDER: [&str; 6] = [
    "it_security",
    "performance_degradation",
    "failure_prediction",
    "anomaly",
    "compliance_audit",
    "operational_risk",
];

fn score_vector_from_value(value: &Value) -> ScoreVector {
    match value {
        Value::Array(items) => {
            let raw: Vec<f64> = items.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect();
            ScoreVector::from_raw(&raw)
        }
        Value::Object(map) => {
            let raw: Vec<f64> = SCORE_FIELD_ORDER
                .iter()
                .map(|field| map.get(*field).and_then(Value::as_f64).unwrap_or(0.0))
                .collect();
            ScoreVector::from_raw(&raw)
        }
        _ => ScoreVector::ZERO,
    }
}

/// Parses a scoring response into one [`ScoreVector`] per requested template,
/// in order. On any structural failure, the entire batch falls back to zero
/// vectors (spec §4.4: "the event is still marked scored, so it is not
/// retried forever"), padding or truncating to `expected_count`.
pub fn parse_scoring_response(content: &str, expected_count: usize) -> Vec<ScoreVector> {
    let parsed: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(_) => return vec![ScoreVector::ZERO; expected_count],
    };

    let items: &Vec<Value> = match &parsed {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("scores").and_then(Value::as_array) {
            Some(items) => items,
            None => return vec![ScoreVector::ZERO; expected_count],
        },
        _ => return vec![ScoreVector::ZERO; expected_count],
    };

    let mut out: Vec<ScoreVector> = items.iter().map(score_vector_from_value).collect();
    // Truncated arrays are padded with zero vectors rather than dropped.
    while out.len() < expected_count {
        out.push(ScoreVector::ZERO);
    }
    out.truncate(expected_count);
    out
}

fn parse_severity(value: Option<&Value>) -> FindingSeverity {
    value
        .and_then(Value::as_str)
        .map(FindingSeverity::from_str_default_medium)
        .unwrap_or(FindingSeverity::Medium)
}

fn parse_uuid_list(value: Option<&Value>) -> Vec<Uuid> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Parses a meta-analysis response. Non-numeric `resolved_indices` entries
/// are dropped rather than rejecting the whole response; malformed
/// severities default to `medium`; meta scores are clamped into [0,1].
pub fn parse_meta_response(content: &str) -> Result<MetaAnalysisResponse, String> {
    let parsed: Value =
        serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))?;

    let obj = parsed
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let meta_scores = obj
        .get("meta_scores")
        .map(score_vector_from_value)
        .unwrap_or(ScoreVector::ZERO);

    let summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let new_findings = obj
        .get("new_findings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let item = item.as_object()?;
                    let text = item.get("text").and_then(Value::as_str)?.to_string();
                    let severity = parse_severity(item.get("severity"));
                    let criterion_slug = item
                        .get("criterion_slug")
                        .or_else(|| item.get("criterion"))
                        .and_then(Value::as_str)
                        .filter(|s| Criterion::from_slug(s).is_some())
                        .map(|s| s.to_string());
                    Some(RawFinding {
                        text,
                        severity,
                        criterion_slug,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let resolved_indices = obj
        .get("resolved_indices")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_u64)
                .map(|n| n as usize)
                .collect()
        })
        .unwrap_or_default();

    let recommended_action = obj
        .get("recommended_action")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let key_event_ids = parse_uuid_list(obj.get("key_event_ids"));

    Ok(MetaAnalysisResponse {
        meta_scores,
        summary,
        new_findings,
        resolved_indices,
        recommended_action,
        key_event_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_response_pads_truncated_array() {
        let content = r#"{"scores": [[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]]}"#;
        let out = parse_scoring_response(content, 3);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].it_security, 0.1);
        assert_eq!(out[1], ScoreVector::ZERO);
        assert_eq!(out[2], ScoreVector::ZERO);
    }

    #[test]
    fn scoring_response_accepts_bare_array() {
        let content = r#"[[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]]"#;
        let out = parse_scoring_response(content, 1);
        assert_eq!(out[0].it_security, 1.0);
    }

    #[test]
    fn scoring_response_falls_back_to_zero_on_malformed_json() {
        let out = parse_scoring_response("not json", 2);
        assert_eq!(out, vec![ScoreVector::ZERO, ScoreVector::ZERO]);
    }

    #[test]
    fn meta_response_defaults_malformed_severity_to_medium() {
        let content = r#"{
            "meta_scores": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            "summary": "ok",
            "new_findings": [{"text": "x", "severity": "not-a-severity"}],
            "resolved_indices": [1, "two", 3.5, 4]
        }"#;
        let parsed = parse_meta_response(content).unwrap();
        assert_eq!(parsed.new_findings[0].severity, FindingSeverity::Medium);
        assert_eq!(parsed.resolved_indices, vec![1, 4]);
    }

    #[test]
    fn meta_response_rejects_non_object_top_level() {
        assert!(parse_meta_response("[1,2,3]").is_err());
    }
}
