//! # Ingestor
//!
//! Command-line entry point.
//!
//! ```bash
//! ingestor                  # backfill the configured days, then tail
//! ingestor backfill 0.5     # backfill the last half day and exit
//! ingestor tail             # follow the head only
//! ingestor retention        # one retention sweep and exit
//! ```
//!
//! Configuration comes from `Config.toml` and `INGEST_*` variables (a `.env` file is
//! loaded first). Ctrl+C stops tail and the periodic sweeper cleanly.

use anyhow::{Context, Result};
use chain_ingestor::settings::MAX_RETENTION_DAYS;
use chain_ingestor::{
    metrics, BackfillJob, IngestionContext, RetentionSweeper, Settings, TailJob, TailReport,
};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "ingestor", version, about = "ERC-20 and Uniswap event ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Prometheus listener (only with the `observability` feature)
    #[arg(long, default_value = "0.0.0.0:9100")]
    metrics_addr: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest the last DAYS of history and exit
    Backfill {
        /// Defaults to `backfill.days`
        days: Option<f64>,
    },
    /// Follow new heads until interrupted
    Tail,
    /// Run one retention sweep and exit
    Retention {
        /// Defaults to `retention.days`
        #[arg(long, value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_RETENTION_DAYS)))]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    install_metrics_exporter(&cli.metrics_addr)?;
    metrics::describe_metrics();

    let settings = Settings::new().context("invalid configuration")?;
    let ctx = IngestionContext::connect(settings).await?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match cli.command {
        Some(Command::Backfill { days }) => {
            let days = days.unwrap_or(ctx.settings.backfill.days);
            BackfillJob::new(ctx).with_cancel(cancel).run(days).await?;
        }
        Some(Command::Tail) => {
            run_tail(ctx, None, cancel).await;
        }
        Some(Command::Retention { days }) => {
            let days = days.unwrap_or(ctx.settings.retention.days);
            let report = RetentionSweeper::new(ctx.db.clone()).run(days).await?;
            info!("✅ Retention removed {} rows", report.total());
        }
        None => {
            let days = ctx.settings.backfill.days;
            let report = BackfillJob::new(ctx.clone())
                .with_cancel(cancel.clone())
                .run(days)
                .await?;
            if !report.cancelled {
                run_tail(ctx, Some(report.end_block), cancel).await;
            }
        }
    }

    info!("👋 Ingestor stopped");
    Ok(())
}

async fn run_tail(ctx: IngestionContext, cursor: Option<u64>, cancel: CancellationToken) -> TailReport {
    let retention = &ctx.settings.retention;
    let sweeper = (retention.interval_secs > 0).then(|| {
        RetentionSweeper::new(ctx.db.clone()).spawn_periodic(
            Duration::from_secs(retention.interval_secs),
            retention.days,
            cancel.clone(),
        )
    });

    let mut job = TailJob::new(ctx.clone());
    if let Some(block) = cursor {
        job = job.with_cursor(block);
    }
    let report = job.run_live(cancel.clone()).await;
    info!(
        "📊 Tail: {} heads, {} blocks ingested, {} failed, {} stale",
        report.heads_received, report.blocks_ingested, report.blocks_failed, report.stale_heads
    );

    cancel.cancel();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            error!("❌ Retention task ended abnormally: {}", e);
        }
    }
    report
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received, stopping tasks...");
                cancel.cancel();
            }
            Err(e) => error!("❌ Failed to listen for Ctrl+C: {}", e),
        }
    });
}

#[cfg(feature = "observability")]
fn install_metrics_exporter(addr: &str) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let addr: std::net::SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid --metrics-addr {}", addr))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing Prometheus exporter")?;
    info!("📈 Metrics exposed on http://{}/metrics", addr);
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn install_metrics_exporter(_addr: &str) -> Result<()> {
    Ok(())
}
