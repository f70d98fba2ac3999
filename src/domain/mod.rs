//! Domain entities for the log-risk analysis pipeline (spec §3).

pub mod alert;
pub mod criterion;
pub mod effective;
pub mod event;
pub mod finding;
pub mod llm_usage;
pub mod meta;
pub mod normal_behavior;
pub mod score;
pub mod system;
pub mod template;
pub mod window;

pub use alert::{AlertHistory, AlertState, NotificationChannel, NotificationRule, RuleTriggerKind, Silence, TriggerConfig};
pub use criterion::{Criterion, ScoreVector};
pub use effective::EffectiveScore;
pub use event::{Event, Severity as EventSeverity};
pub use finding::{Finding, FindingStatus, ResolutionReason, Severity as FindingSeverity};
pub use llm_usage::{LlmUsage, RunType};
pub use meta::{MetaAnalysisResponse, MetaResult, RawFinding};
pub use normal_behavior::NormalBehaviorTemplate;
pub use score::{EventScore, ScoreType};
pub use system::{EventSourceSelector, LogSource, MonitoredSystem, SelectorField};
pub use template::{MessageTemplate, TemplateRepresentative};
pub use window::{Window, WindowTrigger};
