use anyhow::Result;
use pensiondash::{config::Config, server};
use reqwest::Client;
use std::{env, net::SocketAddr, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let config = Config::load()?;
    info!(source = ?config.source, port = config.port, "configured");

    // ─── 3) pull the snapshot and build every table ──────────────────
    let client = Client::new();
    let ctx = pensiondash::init(&config, &client).await?;
    info!(
        states = ctx.states.len(),
        years = ?ctx.fiscal_years,
        "✅ dashboard tables ready"
    );

    // ─── 4) serve ────────────────────────────────────────────────────
    let addr = SocketAddr::new(config.host, config.port);
    server::serve(Arc::new(ctx), addr).await;
    Ok(())
}
