//! # Backfill Job
//!
//! Ingests the last `days` of history ending at the current head. Batches run one
//! after another in ascending block order; within a batch the three log queries and
//! the end-block header are fetched concurrently. A failing batch is logged and
//! recorded in [`BackfillReport::failed_ranges`], then the job moves on.

use crate::context::IngestionContext;
use crate::metrics;
use crate::pipeline::{fetch_block_logs, ingest_logs, IngestStats, PipelineError};
use crate::types::BlockRange;
use crate::utils::{blocks_for_days, create_block_chunks};
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    pub start_block: u64,
    pub end_block: u64,
    pub batches: usize,
    pub failed_ranges: Vec<BlockRange>,
    /// Blocks in batches that completed.
    pub blocks_processed: u64,
    /// Rows persisted.
    pub logs_ingested: u64,
    pub stats: IngestStats,
    pub cancelled: bool,
}

pub struct BackfillJob {
    ctx: IngestionContext,
    cancel: CancellationToken,
}

impl BackfillJob {
    pub fn new(ctx: IngestionContext) -> Self {
        Self {
            ctx,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops between batches once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, days: f64) -> Result<BackfillReport> {
        let head = self
            .ctx
            .rpc
            .block_number()
            .await
            .context("reading chain head for backfill")?;
        let span = blocks_for_days(days, self.ctx.settings.backfill.blocks_per_day);
        let start = head.saturating_sub(span);
        self.run_range(BlockRange {
            from_block: start,
            to_block: head,
        })
        .await
    }

    pub async fn run_range(&self, range: BlockRange) -> Result<BackfillReport> {
        let batch_blocks = self.ctx.settings.backfill.batch_blocks;
        let batches = create_block_chunks(range.from_block, range.to_block, batch_blocks);
        let started = Instant::now();

        info!(
            "🚀 [Backfill] Blocks {} ({} blocks, {} batches of {})",
            range,
            range.len(),
            batches.len(),
            batch_blocks
        );

        let mut report = BackfillReport {
            start_block: range.from_block,
            end_block: range.to_block,
            batches: batches.len(),
            ..Default::default()
        };

        for (i, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("🛑 [Backfill] Cancelled before batch {}", batch);
                report.cancelled = true;
                break;
            }

            match self.run_batch(*batch).await {
                Ok(stats) => {
                    report.blocks_processed += batch.len();
                    report.logs_ingested += stats.persisted();
                    report.stats += stats;
                }
                Err(e) => {
                    error!("❌ [Backfill] Batch {} failed: {}", batch, e);
                    metrics::increment_failed_batches();
                    report.failed_ranges.push(*batch);
                }
            }

            if (i + 1) % 10 == 0 || i + 1 == batches.len() {
                info!(
                    "[Backfill] {}/{} batches, {} rows so far",
                    i + 1,
                    batches.len(),
                    report.logs_ingested
                );
            }
        }

        if !report.failed_ranges.is_empty() {
            let ranges: Vec<String> = report.failed_ranges.iter().map(|r| r.to_string()).collect();
            error!(
                "❌ [Backfill] {} batches failed: {}",
                ranges.len(),
                ranges.join(", ")
            );
        }
        info!(
            "✅ [Backfill] Done in {:.1}s: {} transfers, {} pools ({} already known), {} swaps",
            started.elapsed().as_secs_f64(),
            report.stats.transfers,
            report.stats.pools_inserted,
            report.stats.pools_duplicate,
            report.stats.swaps
        );

        Ok(report)
    }

    async fn run_batch(&self, batch: BlockRange) -> Result<IngestStats, PipelineError> {
        let fetch = async {
            fetch_block_logs(&self.ctx.fetcher, batch)
                .await
                .map_err(PipelineError::from)
        };
        let header = async {
            self.ctx
                .rpc
                .block_header(batch.to_block)
                .await
                .map_err(PipelineError::from)
        };
        let (logs, head) = tokio::try_join!(fetch, header)?;

        // every event in the batch carries the end block's time
        Ok(ingest_logs(&self.ctx.writer, logs.iter(), head.timestamp).await?)
    }
}
