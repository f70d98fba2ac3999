//! Monitored systems and the log-source routing rules they own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Where a system's events should be read from when not pushed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSourceSelector {
    LocalStore,
    ExternalSearchEngine,
}

/// A logical unit (server, service, cluster) being monitored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredSystem {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub retention_days: Option<i32>,
    pub timezone_offset_minutes: Option<i32>,
    pub event_source: EventSourceSelector,
}

/// The fields a [`LogSource`] selector can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorField {
    Host,
    SourceIp,
    Program,
    Service,
    Facility,
}

impl SelectorField {
    pub const ALL: [SelectorField; 5] = [
        SelectorField::Host,
        SelectorField::SourceIp,
        SelectorField::Program,
        SelectorField::Service,
        SelectorField::Facility,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SelectorField::Host => "host",
            SelectorField::SourceIp => "source_ip",
            SelectorField::Program => "program",
            SelectorField::Service => "service",
            SelectorField::Facility => "facility",
        }
    }
}

/// A routing rule owned by one system: events matching every selector field
/// are assigned to `(system_id, log_source_id)`. Lower `priority` is evaluated first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSource {
    pub id: Uuid,
    pub system_id: Uuid,
    pub label: String,
    /// field name -> regex pattern. At least one entry is required (invariant).
    pub selector: HashMap<SelectorField, String>,
    pub priority: i32,
    pub active: bool,
}

impl LogSource {
    pub fn is_valid(&self) -> bool {
        !self.selector.is_empty()
    }
}
