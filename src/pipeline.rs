//! Fetch → decode → write step shared by the backfill and tail jobs.
//!
//! A block range is fetched as three filtered queries (transfers, pool creations,
//! swaps) run concurrently. The results are then decoded and written one log at a
//! time, in that order.

use crate::database::DbError;
use crate::decoder::{self, pool_creation_topics, swap_topics, transfer_topics};
use crate::log_fetcher::{FetchError, LogWindowFetcher};
use crate::metrics;
use crate::rpc_gateway::RpcError;
use crate::types::{BlockRange, DecodedEvent, RawLog};
use crate::writer::{IngestionWriter, WriteOutcome};
use chrono::{DateTime, Utc};
use ethers::types::Filter;
use log::warn;
use std::ops::AddAssign;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Logs for one range, grouped by filter.
#[derive(Debug, Default, Clone)]
pub struct BlockLogs {
    pub transfers: Vec<RawLog>,
    pub pools: Vec<RawLog>,
    pub swaps: Vec<RawLog>,
}

impl BlockLogs {
    pub fn len(&self) -> usize {
        self.transfers.len() + self.pools.len() + self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transfers, then pools, then swaps.
    pub fn iter(&self) -> impl Iterator<Item = &RawLog> {
        self.transfers
            .iter()
            .chain(self.pools.iter())
            .chain(self.swaps.iter())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub transfers: u64,
    pub pools_inserted: u64,
    pub pools_duplicate: u64,
    pub swaps: u64,
    pub unrecognized: u64,
    pub decode_warnings: u64,
}

impl IngestStats {
    /// Rows actually written.
    pub fn persisted(&self) -> u64 {
        self.transfers + self.pools_inserted + self.swaps
    }
}

impl AddAssign for IngestStats {
    fn add_assign(&mut self, other: Self) {
        self.transfers += other.transfers;
        self.pools_inserted += other.pools_inserted;
        self.pools_duplicate += other.pools_duplicate;
        self.swaps += other.swaps;
        self.unrecognized += other.unrecognized;
        self.decode_warnings += other.decode_warnings;
    }
}

pub fn transfer_filter() -> Filter {
    Filter::new().topic0(transfer_topics())
}

pub fn pool_creation_filter() -> Filter {
    Filter::new().topic0(pool_creation_topics())
}

pub fn swap_filter() -> Filter {
    Filter::new().topic0(swap_topics())
}

/// Runs the three filtered fetches for `range` concurrently.
pub async fn fetch_block_logs(
    fetcher: &LogWindowFetcher,
    range: BlockRange,
) -> Result<BlockLogs, FetchError> {
    let (transfer_f, pool_f, swap_f) = (transfer_filter(), pool_creation_filter(), swap_filter());
    let (transfers, pools, swaps) = tokio::try_join!(
        fetcher.fetch_range(range, &transfer_f),
        fetcher.fetch_range(range, &pool_f),
        fetcher.fetch_range(range, &swap_f),
    )?;
    Ok(BlockLogs {
        transfers,
        pools,
        swaps,
    })
}

/// Decodes and writes `logs` sequentially, stamping each event with `timestamp`.
pub async fn ingest_logs<'a, I>(
    writer: &IngestionWriter,
    logs: I,
    timestamp: DateTime<Utc>,
) -> Result<IngestStats, DbError>
where
    I: IntoIterator<Item = &'a RawLog>,
{
    let mut stats = IngestStats::default();

    for log in logs {
        let (event, issues) = decoder::decode_with_issues(log, timestamp);
        if !issues.is_empty() {
            stats.decode_warnings += 1;
            metrics::increment_decode_warnings();
            for issue in &issues {
                warn!(
                    "⚠️ [Decoder] block {} tx {:?} log {}: {}",
                    log.block_number, log.tx_hash, log.log_index, issue
                );
            }
        }

        let outcome = writer.write(&event).await?;
        match (&event, outcome) {
            (DecodedEvent::Transfer(_), WriteOutcome::Inserted) => stats.transfers += 1,
            (DecodedEvent::PoolCreated(_), WriteOutcome::Inserted) => stats.pools_inserted += 1,
            (DecodedEvent::PoolCreated(_), WriteOutcome::Duplicate) => stats.pools_duplicate += 1,
            (DecodedEvent::Swap(_), WriteOutcome::Inserted) => stats.swaps += 1,
            _ => stats.unrecognized += 1,
        }
    }

    Ok(stats)
}

/// Fetch and ingest a range whose timestamp is already known.
pub async fn process_range(
    fetcher: &LogWindowFetcher,
    writer: &IngestionWriter,
    range: BlockRange,
    timestamp: DateTime<Utc>,
) -> Result<IngestStats, PipelineError> {
    let logs = fetch_block_logs(fetcher, range).await?;
    Ok(ingest_logs(writer, logs.iter(), timestamp).await?)
}
