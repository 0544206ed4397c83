//! Brokerage - listings, lead capture and admin back office API

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brokerage::{
    api::{self, AppState},
    cache::create_cache,
    config::{Config, LogFormat, LoggingConfig},
    db,
    services::{create_mailer, resolve_admin_password, ChatModel, GeminiClient},
};

/// Interval of the rate limiter and session cleanup task
const CLEANUP_INTERVAL_SECS: u64 = 300;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter.clone().into());
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("BROKERAGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"));
    let mut config = Config::load_with_env(&config_path)?;

    init_tracing(&config.logging);
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    resolve_admin_password(&mut config.admin)?;

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache);
    tracing::info!(ttl_seconds = config.cache.ttl_seconds, "Cache initialized");

    // Outbound HTTP (Gemini, Resend, Instagram); per-request timeouts are set by each client
    let http = reqwest::Client::builder()
        .user_agent(concat!("brokerage/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let mailer = create_mailer(&config.email, http.clone())?;
    tracing::info!(provider = mailer.name(), "Mailer initialized");

    let model = GeminiClient::from_config(&config.ai, http.clone())
        .map(|client| Arc::new(client) as Arc<dyn ChatModel>);
    if model.is_some() {
        tracing::info!(model = %config.ai.model, "Gemini chat model enabled");
    } else {
        tracing::info!("No Gemini API key configured; chat uses rule-based replies");
    }

    let state = AppState::build(pool.clone(), &config, cache, http, mailer, model);

    // Prune rate limiter windows and expired sessions every 5 minutes
    {
        let limiter = state.rate_limiter.clone();
        let auth = state.auth_service.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
                if let Err(e) = auth.cleanup_expired().await {
                    tracing::warn!("Session cleanup failed: {}", e);
                }
            }
        });
    }

    let app = api::build_router(state, &config.server.cors_origin)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    Ok(())
}
