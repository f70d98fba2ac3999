//! Deterministic message canonicalisation (spec §4.3).

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

struct SentinelRule {
    regex: &'static OnceLock<Regex>,
    pattern: &'static str,
    sentinel: &'static str,
}

static UUID_RE: OnceLock<Regex> = OnceLock::new();
static IPV4_RE: OnceLock<Regex> = OnceLock::new();
static IPV6_RE: OnceLock<Regex> = OnceLock::new();
static HEX_RE: OnceLock<Regex> = OnceLock::new();
static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();
static PATH_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
static NUMERIC_RE: OnceLock<Regex> = OnceLock::new();

// Order matters: more specific patterns (UUID, timestamp, IP) must run
// before the catch-all numeric-id rule, or they'd be partially consumed by it.
fn rules() -> [SentinelRule; 8] {
    [
        SentinelRule {
            regex: &UUID_RE,
            pattern: r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
            sentinel: "<uuid>",
        },
        SentinelRule {
            regex: &TIMESTAMP_RE,
            pattern: r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?",
            sentinel: "<ts>",
        },
        SentinelRule {
            regex: &IPV6_RE,
            pattern: r"(?:[0-9a-fA-F]{1,4}:){2,7}[0-9a-fA-F]{1,4}",
            sentinel: "<ip>",
        },
        SentinelRule {
            regex: &IPV4_RE,
            pattern: r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
            sentinel: "<ip>",
        },
        SentinelRule {
            regex: &QUOTED_RE,
            pattern: r#"'[^']*'|"[^"]*""#,
            sentinel: "<str>",
        },
        SentinelRule {
            regex: &PATH_RE,
            pattern: r"(?:/[\w.\-]+){2,}",
            sentinel: "<path>",
        },
        SentinelRule {
            regex: &HEX_RE,
            pattern: r"\b0x[0-9a-fA-F]+\b",
            sentinel: "<num>",
        },
        SentinelRule {
            regex: &NUMERIC_RE,
            pattern: r"\b\d+\b",
            sentinel: "<num>",
        },
    ]
}

fn compiled(rule: &SentinelRule) -> &'static Regex {
    rule.regex.get_or_init(|| Regex::new(rule.pattern).unwrap())
}

/// Collapses SQL literal lists (`IN (1, 2, 3)`) and runs of whitespace.
fn normalize_sql(input: &str) -> String {
    static IN_LIST_RE: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let in_list = IN_LIST_RE.get_or_init(|| {
        Regex::new(r"(?i)\bin\s*\(\s*(<num>|<str>)(\s*,\s*(<num>|<str>))*\s*\)").unwrap()
    });
    let collapsed = in_list.replace_all(input, "in (<list>)");

    let whitespace = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").unwrap());
    whitespace.replace_all(&collapsed, " ").trim().to_string()
}

/// Lower-cases, trims, substitutes sentinel tokens for numeric/id-like
/// content, then optionally normalises SQL literal lists.
pub fn canonicalize(message: &str, normalize_sql_literals: bool) -> String {
    let mut text = message.trim().to_ascii_lowercase();

    for rule in rules() {
        let regex = compiled(&rule);
        text = regex.replace_all(&text, rule.sentinel).into_owned();
    }

    if normalize_sql_literals {
        text = normalize_sql(&text);
    }

    text
}

pub fn pattern_hash(canonical_form: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_numeric_ids_with_sentinel() {
        let canonical = canonicalize("User 42891 logged in", false);
        assert_eq!(canonical, "user <num> logged in");
    }

    #[test]
    fn replaces_uuid_with_sentinel() {
        let canonical = canonicalize(
            "session 550e8400-e29b-41d4-a716-446655440000 expired",
            false,
        );
        assert_eq!(canonical, "session <uuid> expired");
    }

    #[test]
    fn replaces_ipv4_with_sentinel() {
        let canonical = canonicalize("connection from 10.0.0.5 refused", false);
        assert_eq!(canonical, "connection from <ip> refused");
    }

    #[test]
    fn same_shape_messages_canonicalize_identically() {
        let a = canonicalize("User 1 logged in from 10.0.0.1", false);
        let b = canonicalize("User 99182 logged in from 10.0.0.254", false);
        assert_eq!(a, b);
    }

    #[test]
    fn sql_literal_lists_collapse_when_enabled() {
        let canonical = canonicalize("select * where id in (1, 2, 3)", true);
        assert!(canonical.contains("in (<list>)"));
    }

    #[test]
    fn hash_is_stable_for_same_input() {
        assert_eq!(pattern_hash("a canonical form"), pattern_hash("a canonical form"));
        assert_ne!(pattern_hash("a"), pattern_hash("b"));
    }
}
