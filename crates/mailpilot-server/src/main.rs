//! Mailpilot - email assistant server entry point

use anyhow::Result;
use mailpilot_api::AppState;
use mailpilot_common::config::Config;
use mailpilot_core::{EngineConfig, GmailSmtpVendor, MailEngine, SweepDriver};
use mailpilot_storage::repository::{
    DbCredentialRepository, DbMessageRepository, DbRecurringMailRepository, DbSessionRepository,
};
use mailpilot_storage::DatabasePool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Mailpilot server...");

    let config = Config::load()?;

    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    let messages = Arc::new(DbMessageRepository::new(db_pool.clone()));
    let recurring = Arc::new(DbRecurringMailRepository::new(db_pool.clone()));
    let credentials = Arc::new(DbCredentialRepository::new(db_pool.clone()));
    let sessions = Arc::new(DbSessionRepository::new(db_pool.clone()));

    let vendor = Arc::new(GmailSmtpVendor::new(
        config.smtp.clone(),
        config.google.clone(),
    ));

    let engine = Arc::new(MailEngine::new(
        messages.clone(),
        recurring.clone(),
        credentials.clone(),
        vendor,
        EngineConfig {
            tracking_base_url: config.tracking.public_url.clone(),
            batch_size: config.sweep.batch_size,
        },
    ));

    // Two independent sweep timers; each sweep kind serializes against
    // itself inside the engine
    let driver = Arc::new(SweepDriver::new(engine.clone(), config.sweep.interval_secs));

    let message_sweep_handle = {
        let driver = driver.clone();
        tokio::spawn(async move {
            driver.run_message_sweep().await;
        })
    };

    let recurring_sweep_handle = {
        let driver = driver.clone();
        tokio::spawn(async move {
            driver.run_recurring_sweep().await;
        })
    };

    let state = Arc::new(AppState {
        engine,
        sessions,
        credentials,
        messages,
        tracking_public_url: config.tracking.public_url.clone(),
    });

    let api_handle = {
        let bind = format!("{}:{}", config.server.bind_address, config.api.port);
        tokio::spawn(async move {
            let app = mailpilot_api::create_router(state);
            match tokio::net::TcpListener::bind(&bind).await {
                Ok(listener) => {
                    info!("API server listening on {}", bind);
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!("API server error: {}", e);
                    }
                }
                Err(e) => tracing::error!("Failed to bind API server on {}: {}", bind, e),
            }
        })
    };

    info!("Mailpilot server started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    message_sweep_handle.abort();
    recurring_sweep_handle.abort();
    api_handle.abort();

    info!("Mailpilot server shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailpilot=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
