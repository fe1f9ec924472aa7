//! mishwar-server: ride-hailing and delivery dispatch service
//!
//! Long-running service that:
//! - Tracks orders through a guarded lifecycle with an append-only trail
//! - Keeps driver prepaid wallets consistent under concurrent acceptance
//! - Fans new orders out to eligible connected drivers
//! - Streams order updates and driver locations over WebSocket

use mishwar_server::{AppState, Config, api};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mishwar_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        environment = %config.environment,
        port = config.http_port,
        "Starting mishwar-server"
    );

    let state = AppState::new(config.clone())?;
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("mishwar-server listening on {addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
