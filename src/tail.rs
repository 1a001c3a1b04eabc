//! # Tail Job
//!
//! Follows the chain head one block at a time. Each head is ingested with fetches
//! scoped to exactly `[n, n]` and stamped with the head's own timestamp.
//!
//! The cursor (last handled block) lives in memory only:
//! - heads at or below the cursor are skipped
//! - a gap of up to `max_catch_up_blocks` is filled block by block before the head
//! - a failing block is logged and the cursor still moves past it

use crate::context::IngestionContext;
use crate::head_subscription::{self, Backoff};
use crate::metrics;
use crate::pipeline::{process_range, IngestStats, PipelineError};
use crate::types::{BlockHead, BlockRange};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const HEAD_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct TailReport {
    pub heads_received: u64,
    pub blocks_ingested: u64,
    pub blocks_failed: u64,
    pub stale_heads: u64,
    pub catch_up_blocks: u64,
    /// Blocks in gaps too large to fill.
    pub skipped_blocks: u64,
    pub last_block: Option<u64>,
    pub stats: IngestStats,
}

pub struct TailJob {
    ctx: IngestionContext,
    cursor: Option<u64>,
}

impl TailJob {
    pub fn new(ctx: IngestionContext) -> Self {
        Self { ctx, cursor: None }
    }

    /// Treats `block` as already ingested, e.g. the end of a preceding backfill.
    pub fn with_cursor(mut self, block: u64) -> Self {
        self.cursor = Some(block);
        self
    }

    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Subscribes to new heads on the configured WebSocket endpoint and tails until cancelled.
    pub async fn run_live(&mut self, cancel: CancellationToken) -> TailReport {
        let (tx, rx) = mpsc::channel(HEAD_CHANNEL_CAPACITY);
        let subscription_cancel = cancel.child_token();
        let handle = head_subscription::spawn(
            self.ctx.settings.rpc.ws_url.clone(),
            tx,
            subscription_cancel.clone(),
            Backoff::from_settings(&self.ctx.settings.tail),
        );

        let report = self.run(rx, cancel).await;

        subscription_cancel.cancel();
        if let Err(e) = handle.await {
            warn!("⚠️ [Tail] Head subscription task ended abnormally: {}", e);
        }
        report
    }

    /// Consumes heads until `cancel` fires or the channel closes.
    pub async fn run(
        &mut self,
        mut heads: mpsc::Receiver<BlockHead>,
        cancel: CancellationToken,
    ) -> TailReport {
        let mut report = TailReport::default();
        info!("🚀 [Tail] Following chain head (cursor {:?})", self.cursor);

        loop {
            let head = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("🛑 [Tail] Cancelled at cursor {:?}", self.cursor);
                    break;
                }
                head = heads.recv() => match head {
                    Some(head) => head,
                    None => {
                        info!("[Tail] Head stream closed at cursor {:?}", self.cursor);
                        break;
                    }
                },
            };
            report.heads_received += 1;
            self.handle_head(head, &mut report, &cancel).await;
        }

        report.last_block = self.cursor;
        report
    }

    async fn handle_head(
        &mut self,
        head: BlockHead,
        report: &mut TailReport,
        cancel: &CancellationToken,
    ) {
        metrics::set_tail_head_block(head.number);

        if let Some(cursor) = self.cursor {
            if head.number <= cursor {
                debug!("[Tail] Skipping stale head {} (cursor {})", head.number, cursor);
                report.stale_heads += 1;
                metrics::increment_tail_blocks("stale");
                return;
            }

            let missed = head.number - cursor - 1;
            if missed > self.ctx.settings.tail.max_catch_up_blocks {
                warn!(
                    "⚠️ [Tail] Gap of {} blocks before head {} exceeds catch-up limit {}, skipping it",
                    missed, head.number, self.ctx.settings.tail.max_catch_up_blocks
                );
                report.skipped_blocks += missed;
                metrics::increment_tail_blocks("skipped");
            } else if missed > 0 {
                info!("[Tail] Catching up {} missed blocks before {}", missed, head.number);
                for number in (cursor + 1)..head.number {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let outcome = self.catch_up_block(number).await;
                    report.catch_up_blocks += 1;
                    self.record(number, outcome, report);
                }
                if cancel.is_cancelled() {
                    return;
                }
            }
        }

        let outcome = self.ingest_block(head.number, head.timestamp).await;
        self.record(head.number, outcome, report);
    }

    async fn catch_up_block(&self, number: u64) -> Result<IngestStats, PipelineError> {
        let header = self.ctx.rpc.block_header(number).await?;
        self.ingest_block(number, header.timestamp).await
    }

    async fn ingest_block(
        &self,
        number: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<IngestStats, PipelineError> {
        process_range(
            &self.ctx.fetcher,
            &self.ctx.writer,
            BlockRange::single(number),
            timestamp,
        )
        .await
    }

    fn record(
        &mut self,
        number: u64,
        outcome: Result<IngestStats, PipelineError>,
        report: &mut TailReport,
    ) {
        match outcome {
            Ok(stats) => {
                debug!(
                    "[Tail] Block {}: {} transfers, {} pools, {} swaps",
                    number, stats.transfers, stats.pools_inserted, stats.swaps
                );
                report.blocks_ingested += 1;
                report.stats += stats;
                metrics::increment_tail_blocks("ingested");
            }
            Err(e) => {
                error!("❌ [Tail] Block {} failed: {}", number, e);
                report.blocks_failed += 1;
                metrics::increment_tail_blocks("failed");
            }
        }
        self.cursor = Some(number);
    }
}
