//! # Passkey Relying-Party Server
//!
//! Binary entry point: configuration, logging, the challenge sweep and the
//! HTTP listener. Everything else lives in the library crate.

use passkey_rp_server::config::Config;
use passkey_rp_server::db::CredentialStore;
use passkey_rp_server::handlers;
use passkey_rp_server::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: info for dependencies, debug for this crate.
    // RUST_LOG overrides it.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_rp_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!(
        rp_id = %app_state.rp.id,
        origin = %app_state.rp.origin,
        "Application state initialized"
    );

    spawn_challenge_sweep(
        app_state.store.clone(),
        app_state.rp.challenge_ttl,
        Duration::from_secs(config.challenge_sweep_secs),
    );

    let app = handlers::router(app_state)?;

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop challenges that can no longer pass the TTL check, so
/// abandoned ceremonies do not accumulate.
fn spawn_challenge_sweep(store: Arc<dyn CredentialStore>, ttl: chrono::Duration, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - ttl;
            match store.purge_expired_challenges(cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Removed expired challenges"),
                Err(e) => tracing::error!("Challenge cleanup failed: {:?}", e),
            }
        }
    });
}
