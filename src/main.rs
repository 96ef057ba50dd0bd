use anyhow::{Context, Result};
use clap::Parser;
use eshop_pulse::merge::{CorrectionSet, RateTable};
use eshop_pulse::pipeline::run_once;
use eshop_pulse::providers;
use eshop_pulse::store::JsonStore;
use eshop_pulse::telemetry::init_tracing;
use eshop_pulse::util::env as env_util;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pulse", version, about = "eShop price collection pipeline")]
struct Cli {
    /// Run a single collect→normalize→store→merge cycle and exit.
    #[arg(long)]
    once: bool,
    /// Root directory for pipeline artifacts (default: DATA_DIR env or ./data).
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --- logging -------------------------------------------------------------
    env_util::init_env();
    init_tracing("info")?;

    // --- configuration -------------------------------------------------------
    let data_dir = cli
        .data_dir
        .or_else(|| env_util::env_opt("DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));
    let refresh_minutes: u64 = env_util::env_parse("REFRESH_MINUTES", 60u64).max(1);

    let store = JsonStore::new(&data_dir);
    let rates = RateTable::from_env().context("loading rate table")?;
    let corrections = CorrectionSet::from_env().context("loading correction rules")?;
    let provider_set = providers::from_env().context("building provider set")?;

    info!(
        data_dir = %data_dir.display(),
        refresh_minutes,
        providers = provider_set.len(),
        reference_currency = %rates.reference,
        "pulse configured"
    );

    if cli.once {
        let report = run_once(&provider_set, &store, &rates, &corrections).await?;
        info!(
            run_id = %report.run_id,
            offers = report.offers_collected,
            merged_games = report.merged_games,
            "single cycle complete"
        );
        return Ok(());
    }

    // --- shutdown wiring -----------------------------------------------------
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = JoinSet::new();

    // --- pipeline loop -------------------------------------------------------
    {
        let mut rx = shutdown_tx.subscribe();
        tasks.spawn(async move {
            // drift-free interval; immediate first tick
            let mut ticker =
                tokio::time::interval(Duration::from_secs(refresh_minutes * 60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = rx.recv() => {
                        info!("pipeline: shutdown");
                        break;
                    }
                }

                info!("pipeline: tick");
                let t_run = std::time::Instant::now();
                match run_once(&provider_set, &store, &rates, &corrections).await {
                    Ok(report) => {
                        info!(
                            run_id = %report.run_id,
                            elapsed_ms = %t_run.elapsed().as_millis(),
                            offers = report.offers_collected,
                            items = report.items_normalized,
                            merged_games = report.merged_games,
                            provider_failures = report.provider_failures,
                            "pipeline: tick complete"
                        );
                    }
                    Err(e) => {
                        // Persistence failed: this run is abandoned, the prior
                        // artifacts remain last-known-good for readers.
                        error!(error = %e, "pipeline run failed");
                    }
                }
            }
        });
    }

    // --- Ctrl+C waiter & graceful shutdown ----------------------------------
    info!("service started; press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    info!("shutdown: Ctrl+C received");

    let _ = shutdown_tx.send(());
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "task join error");
        }
    }

    info!("all tasks stopped");
    Ok(())
}
