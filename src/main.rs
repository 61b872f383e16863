mod cache;
mod config;
mod error;
mod history;
mod metrics;
mod model;
mod schedule;
mod score;
mod store;
mod web;

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::score::engine::ScoreEngine;
use crate::store::sqlite::SqliteStore;
use crate::web::server::WebServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "oven-score.toml".to_string());

    let config = Config::load(&config_path)?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "oven_score=info".into());
    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("🔥 oven-score v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Config loaded from {}", config_path);

    let config = Arc::new(config);

    // Store + engine (entity cache, counters, decay, ranking)
    let store = Arc::new(SqliteStore::open(&config.store.path)?);
    if let Some(seed) = &config.store.seed_path {
        store.seed_if_empty(seed)?;
    }
    let engine = Arc::new(ScoreEngine::new(config.clone(), store)?);

    // Start decay scheduler
    let decay_engine = engine.clone();
    tokio::spawn(async move {
        decay_engine.run_decay_loop().await;
    });

    // Web API runs in the foreground
    let web = WebServer::new(engine.clone(), config.clone());
    web.run().await?;

    if !config.web.enabled {
        // Nothing else to serve; keep the scheduler alive
        tokio::signal::ctrl_c().await?;
    }
    info!("oven-score stopped");
    Ok(())
}
