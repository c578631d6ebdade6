//! Pull the full PPD variable list and store it in the `pensions` table.
//!
//! `PENSIONDASH_DB` picks the SQLite file (default `pensions.db`),
//! `PENSIONDASH_API` the endpoint.

use anyhow::{Context, Result};
use pensiondash::{fetch, store::PensionStore};
use reqwest::Client;
use std::{env, path::PathBuf, time::Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let db_path = PathBuf::from(env::var("PENSIONDASH_DB").unwrap_or_else(|_| "pensions.db".into()));
    let endpoint =
        env::var("PENSIONDASH_API").unwrap_or_else(|_| fetch::DEFAULT_ENDPOINT.to_string());

    let start = Instant::now();
    let client = Client::new();
    let table = fetch::fetch_plan_table(
        &client,
        &endpoint,
        &fetch::to_owned_list(fetch::LOADER_VARIABLES),
    )
    .await?;
    info!(rows = table.rows.len(), elapsed = ?start.elapsed(), "downloaded");

    let written = tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut store = PensionStore::open(&db_path)?;
        store.migrate()?;
        store.replace_all(&table)
    })
    .await
    .context("store task panicked")??;

    info!(rows = written, elapsed = ?start.elapsed(), "all done");
    Ok(())
}
