//! User-curated regexes marking events as routine, excluding them from scoring.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NormalBehaviorTemplate {
    pub id: Uuid,
    pub system_id: Uuid,
    pub message_pattern: String,
    pub host_pattern: Option<String>,
    pub program_pattern: Option<String>,
    pub enabled: bool,
}
