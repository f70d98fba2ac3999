//! Process entrypoint: wires the connection pool, LLM client, every
//! component, and runs the orchestrator's scheduler loop until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use logrisk_pipeline::alerts::{AlertEvaluator, WebhookDispatcher};
use logrisk_pipeline::config::{AppConfigCache, PipelineSettings};
use logrisk_pipeline::db::{Database, DatabasePoolConfig};
use logrisk_pipeline::findings::FindingEngine;
use logrisk_pipeline::health::PipelineHealth;
use logrisk_pipeline::ingest::router::RouterSnapshot;
use logrisk_pipeline::ingest::SourceRouter;
use logrisk_pipeline::llm::{LlmClient, LlmClientConfig, PromptSet};
use logrisk_pipeline::meta::MetaAnalyser;
use logrisk_pipeline::metrics::PipelineMetrics;
use logrisk_pipeline::repository::Repositories;
use logrisk_pipeline::scoring::EventScorer;
use logrisk_pipeline::windowing::Windower;
use logrisk_pipeline::Orchestrator;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logrisk_pipeline=info")),
        )
        .init();
}

async fn resolve_llm_api_key(settings: &PipelineSettings) -> String {
    std::env::var(&settings.llm_api_key_env).unwrap_or_default()
}

/// Builds the initial source-router snapshot from every active log source
/// across every system. Called again on a timer so source CRUD elsewhere
/// in the deployment is picked up without restarting this process.
async fn build_router(repos: &Repositories) -> anyhow::Result<SourceRouter> {
    let sources = repos.systems.all_active_log_sources().await?;
    let snapshot = RouterSnapshot::compile(sources)?;
    Ok(SourceRouter::new(snapshot))
}

fn spawn_router_refresh(repos: Repositories, router: SourceRouter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match repos.systems.all_active_log_sources().await {
                Ok(sources) => match RouterSnapshot::compile(sources) {
                    Ok(snapshot) => router.swap(snapshot),
                    Err(e) => error!(error = %e, "failed to recompile source router snapshot"),
                },
                Err(e) => error!(error = %e, "failed to refresh log sources"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "starting logrisk orchestrator");

    let settings = PipelineSettings::load().map_err(|e| {
        error!(error = %e, "fatal configuration error at startup");
        anyhow::anyhow!(e.to_string())
    })?;

    info!("connecting to database");
    let database = Database::connect(&settings.database_url, DatabasePoolConfig::default()).await?;
    database.run_migrations().await?;

    let repos = Repositories::new(database.pool().clone());
    let metrics = Arc::new(PipelineMetrics::new());
    let health = Arc::new(PipelineHealth::new());

    let router = build_router(&repos).await?;
    spawn_router_refresh(repos.clone(), router.clone());

    let llm_client = Arc::new(LlmClient::new(LlmClientConfig {
        base_url: settings.llm_base_url.clone(),
        api_key: resolve_llm_api_key(&settings).await,
        model: settings.llm_model.clone(),
        timeout: settings.llm_call_timeout(),
    }));
    let prompts = PromptSet::default();

    let config_cache = Arc::new(AppConfigCache::new(Duration::from_secs(60)));
    match repos.app_config.load_all().await {
        Ok(values) => config_cache.replace(values),
        Err(e) => error!(error = %e, "initial app_config load failed, starting with defaults"),
    }

    let scorer = Arc::new(EventScorer::new(
        repos.clone(),
        llm_client.clone(),
        prompts.clone(),
        metrics.clone(),
    ));
    let windower = Arc::new(Windower::new(repos.clone()));
    let meta_analyser = Arc::new(MetaAnalyser::new(
        repos.clone(),
        llm_client.clone(),
        prompts.clone(),
        metrics.clone(),
    ));
    let finding_engine = Arc::new(FindingEngine::new(repos.clone()));
    let dispatcher = Arc::new(WebhookDispatcher::new());
    let alert_evaluator = Arc::new(AlertEvaluator::new(repos.clone(), dispatcher));

    let orchestrator = Arc::new(Orchestrator::new(
        repos,
        scorer,
        windower,
        meta_analyser,
        finding_engine,
        alert_evaluator,
        config_cache,
        settings,
        health,
        metrics,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(orchestrator.run_scheduler(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;

    database.close().await;
    Ok(())
}
