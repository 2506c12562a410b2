use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use relay::Relay;
use server::{build_router, config::load_settings, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    let relay = Relay::new(settings.relay_config())?;
    info!(
        base_url = %settings.inference_base_url,
        mode = ?relay.mode(),
        "inference relay configured"
    );

    let state = AppState {
        relay,
        max_upload_bytes: settings.max_upload_bytes,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
