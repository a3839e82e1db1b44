use std::time::Duration;

use anyhow::Context;
use db::DBService;
use server::{AppState, routes};
use services::services::{config::Config, email::sender_from_settings};
use tracing::{debug, info};
use utils::logging::init_tracing;

const RATE_LIMIT_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let db = DBService::new(&config.database_url)
        .await
        .context("failed to open database")?;
    let email_sender = sender_from_settings(&config.email)?;
    let bind_address = config.bind_address();
    let state = AppState::new(db, config, email_sender);

    let limiter = state.rate_limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = limiter.purge_idle().await;
            if purged > 0 {
                debug!(purged, "Purged idle rate limit buckets");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(address = %bind_address, "Server listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
