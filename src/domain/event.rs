//! Normalised event records and the hash that makes them idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// RFC-5424-ish severity names, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    /// Maps RFC-5424 numeric severities (0 = emergency .. 7 = debug).
    pub fn from_numeric(n: i64) -> Option<Self> {
        Some(match n {
            0 => Severity::Emergency,
            1 => Severity::Alert,
            2 => Severity::Critical,
            3 => Severity::Error,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Info,
            7 => Severity::Debug,
            _ => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "debug" => Severity::Debug,
            "info" | "informational" => Severity::Info,
            "notice" => Severity::Notice,
            "warning" | "warn" => Severity::Warning,
            "error" | "err" => Severity::Error,
            "critical" | "crit" => Severity::Critical,
            "alert" => Severity::Alert,
            "emergency" | "emerg" | "panic" => Severity::Emergency,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Alert => "alert",
            Severity::Emergency => "emergency",
        }
    }
}

/// A single normalised, routed log event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub system_id: Uuid,
    pub log_source_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
    pub host: Option<String>,
    pub source_ip: Option<String>,
    pub service: Option<String>,
    pub facility: Option<String>,
    pub program: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub external_id: Option<String>,
    pub raw: serde_json::Value,
    pub normalized_hash: String,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub scored_at: Option<DateTime<Utc>>,
}

impl Event {
    /// SHA-256 of `(timestamp, message, host, source_ip, service, program, facility)`
    /// joined by a null byte, so field-boundary injection via delimiter characters
    /// cannot produce a collision (spec §3, scenario S6).
    pub fn compute_normalized_hash(
        timestamp: DateTime<Utc>,
        message: &str,
        host: Option<&str>,
        source_ip: Option<&str>,
        service: Option<&str>,
        program: Option<&str>,
        facility: Option<&str>,
    ) -> String {
        let mut hasher = Sha256::new();
        let parts = [
            timestamp.to_rfc3339(),
            message.to_string(),
            host.unwrap_or("").to_string(),
            source_ip.unwrap_or("").to_string(),
            service.unwrap_or("").to_string(),
            program.unwrap_or("").to_string(),
            facility.unwrap_or("").to_string(),
        ];
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([0u8]);
            }
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn recompute_normalized_hash(&self) -> String {
        Self::compute_normalized_hash(
            self.timestamp,
            &self.message,
            self.host.as_deref(),
            self.source_ip.as_deref(),
            self.service.as_deref(),
            self.program.as_deref(),
            self.facility.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_injection_does_not_collide() {
        let ts = Utc::now();
        let a = Event::compute_normalized_hash(ts, "m", Some("a"), None, Some("b|c"), None, None);
        let b = Event::compute_normalized_hash(ts, "m", Some("a|b"), None, Some("c"), None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn severity_numeric_mapping_matches_rfc5424() {
        assert_eq!(Severity::from_numeric(0), Some(Severity::Emergency));
        assert_eq!(Severity::from_numeric(7), Some(Severity::Debug));
        assert_eq!(Severity::from_numeric(8), None);
    }

    #[test]
    fn severity_ordering_places_debug_lowest() {
        assert!(Severity::Debug < Severity::Error);
        assert!(Severity::Error < Severity::Emergency);
    }
}
