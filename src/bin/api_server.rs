// HTTP API server binary for eshop-pulse
// Serves the read-only JSON API over the pipeline artifacts

use anyhow::{Context, Result};
use eshop_pulse::api::ApiServer;
use eshop_pulse::merge::RateTable;
use eshop_pulse::store::JsonStore;
use eshop_pulse::telemetry::init_tracing;
use eshop_pulse::util::env as env_util;
use std::path::PathBuf;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();
    init_tracing("info,actix_web=info")?;

    tracing::info!("Initializing eshop-pulse API server");

    // Load configuration from environment
    let server = ApiServer::from_env()?;

    let data_dir = env_util::env_opt("DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));
    let store = JsonStore::new(data_dir);
    let rates = RateTable::from_env().context("loading rate table")?;

    // Start HTTP server
    server.run(store, rates).await?;

    Ok(())
}
