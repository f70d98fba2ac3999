//! Persistence layer: one repository per entity family, all built on the
//! shared connection pool.

pub mod alerts;
pub mod app_config;
pub mod events;
pub mod findings;
pub mod llm_usage;
pub mod meta;
pub mod normal_behavior;
pub mod scores;
pub mod systems;
pub mod templates;
pub mod windows;

use sqlx::PgPool;

use alerts::AlertRepository;
use app_config::AppConfigRepository;
use events::EventRepository;
use findings::FindingRepository;
use llm_usage::LlmUsageRepository;
use meta::MetaResultRepository;
use normal_behavior::NormalBehaviorRepository;
use scores::ScoreRepository;
use systems::SystemRepository;
use templates::TemplateRepository;
use windows::WindowRepository;

/// Every repository, constructed once from a shared pool and handed around
/// as explicit state (spec §9) rather than accessed through globals.
#[derive(Clone)]
pub struct Repositories {
    pub systems: std::sync::Arc<SystemRepository>,
    pub events: std::sync::Arc<EventRepository>,
    pub templates: std::sync::Arc<TemplateRepository>,
    pub scores: std::sync::Arc<ScoreRepository>,
    pub windows: std::sync::Arc<WindowRepository>,
    pub meta: std::sync::Arc<MetaResultRepository>,
    pub findings: std::sync::Arc<FindingRepository>,
    pub alerts: std::sync::Arc<AlertRepository>,
    pub llm_usage: std::sync::Arc<LlmUsageRepository>,
    pub app_config: std::sync::Arc<AppConfigRepository>,
    pub normal_behavior: std::sync::Arc<NormalBehaviorRepository>,
}

impl Repositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            systems: std::sync::Arc::new(SystemRepository::new(pool.clone())),
            events: std::sync::Arc::new(EventRepository::new(pool.clone())),
            templates: std::sync::Arc::new(TemplateRepository::new(pool.clone())),
            scores: std::sync::Arc::new(ScoreRepository::new(pool.clone())),
            windows: std::sync::Arc::new(WindowRepository::new(pool.clone())),
            meta: std::sync::Arc::new(MetaResultRepository::new(pool.clone())),
            findings: std::sync::Arc::new(FindingRepository::new(pool.clone())),
            alerts: std::sync::Arc::new(AlertRepository::new(pool.clone())),
            llm_usage: std::sync::Arc::new(LlmUsageRepository::new(pool.clone())),
            app_config: std::sync::Arc::new(AppConfigRepository::new(pool.clone())),
            normal_behavior: std::sync::Arc::new(NormalBehaviorRepository::new(pool)),
        }
    }
}
