use anyhow::Context;
use claude_relay::logging::{init_tracing, log_info, log_warn};
use claude_relay::{gateway, Credential, OAuthClient, RelayConfig, SqliteStore, TokenManager};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RelayConfig::from_env().context("Invalid relay configuration")?;
    let store = Arc::new(
        SqliteStore::open(&config.store_path)
            .with_context(|| format!("Cannot open store at {}", config.store_path.display()))?,
    );
    let exchanger = Arc::new(OAuthClient::new(config.oauth.clone()));
    let state = gateway::AppState::new(&config, store, exchanger)?;

    seed_credential(&state.tokens, config.seed_refresh_token.as_deref()).await?;

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Cannot listen on port {}", config.port))?;
    log_info!(
        port = config.port,
        upstream = %config.upstream.base_url,
        "claude-relay listening"
    );

    axum::serve(listener, gateway::router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Install `CLAUDE_REFRESH_TOKEN` when the store has no credential yet.
async fn seed_credential(tokens: &TokenManager, seed: Option<&str>) -> anyhow::Result<()> {
    let existing = tokens.credential().await?;
    match (existing, seed) {
        (None, Some(refresh_token)) => {
            tokens
                .install(Credential::from_refresh_token(refresh_token))
                .await?;
            log_info!("Seeded OAuth credential from CLAUDE_REFRESH_TOKEN");
        }
        (None, None) => {
            log_warn!("No OAuth credential stored; requests will fail with 401 until one is installed");
        }
        (Some(_), _) => {}
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log_warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    log_info!("Shutting down");
}
