//! # Log Window Fetcher
//!
//! Fetches logs for a block range as a series of `eth_getLogs` windows. When the node
//! signals overload, the window that failed is halved and retried from the same start
//! block; after a success the next window goes back to the nominal span.
//!
//! The successful windows, concatenated in order, cover `[from, to]` exactly once.

use crate::metrics;
use crate::rpc_gateway::{RpcClient, RpcError};
use crate::settings::Fetcher as FetcherSettings;
use crate::types::{BlockRange, RawLog};
use ethers::types::{BlockNumber, Filter};
use log::{debug, warn};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Requested range [{from_block}, {to_block}] spans {blocks} blocks, limit is {max_range}")]
    RangeTooLarge {
        from_block: u64,
        to_block: u64,
        blocks: u64,
        max_range: u64,
    },
    #[error("Invalid range: from {from_block} > to {to_block}")]
    InvalidRange { from_block: u64, to_block: u64 },
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("Cannot shrink window at block {from_block} below {span} blocks")]
    ShrinkExhausted {
        from_block: u64,
        span: u64,
        #[source]
        source: RpcError,
    },
}

#[derive(Clone)]
pub struct LogWindowFetcher {
    rpc: Arc<dyn RpcClient>,
    chunk_span: u64,
    min_span: u64,
    max_range: u64,
}

impl LogWindowFetcher {
    pub fn new(rpc: Arc<dyn RpcClient>, settings: &FetcherSettings) -> Self {
        Self {
            rpc,
            chunk_span: settings.chunk_span.max(1),
            min_span: settings.min_span.max(1),
            max_range: settings.max_range,
        }
    }

    /// Fetches every log matching `filter` in `[from_block, to_block]`.
    ///
    /// The block bounds already set on `filter` are ignored; each window sets its own.
    pub async fn fetch(
        &self,
        from_block: u64,
        to_block: BlockNumber,
        filter: &Filter,
    ) -> Result<Vec<RawLog>, FetchError> {
        let to_block = match to_block {
            BlockNumber::Number(n) => n.as_u64(),
            BlockNumber::Earliest => 0,
            // latest, pending, safe, finalized: pinned to the head once per call
            _ => self.rpc.block_number().await?,
        };
        let range = BlockRange {
            from_block,
            to_block,
        };
        self.fetch_range(range, filter).await
    }

    /// Same as [`fetch`](Self::fetch) for an already resolved range.
    pub async fn fetch_range(
        &self,
        range: BlockRange,
        filter: &Filter,
    ) -> Result<Vec<RawLog>, FetchError> {
        self.check_range(range.from_block, range.to_block)?;

        let mut logs = Vec::new();
        let mut cursor = range.from_block;
        let mut span = self.chunk_span;

        loop {
            let end = cursor.saturating_add(span - 1).min(range.to_block);
            let window = filter.clone().from_block(cursor).to_block(end);

            match self.rpc.get_logs(&window).await {
                Ok(batch) => {
                    debug!(
                        "[LogFetcher] Window [{}, {}] returned {} logs",
                        cursor,
                        end,
                        batch.len()
                    );
                    logs.extend(batch);
                    if end >= range.to_block {
                        break;
                    }
                    cursor = end + 1;
                    span = self.chunk_span;
                }
                Err(e) if e.is_overload() => {
                    let current = end - cursor + 1;
                    let halved = current / 2;
                    if halved < self.min_span {
                        return Err(FetchError::ShrinkExhausted {
                            from_block: cursor,
                            span: current,
                            source: e,
                        });
                    }
                    warn!(
                        "⚠️ [LogFetcher] Overload on [{}, {}] ({}), retrying with {} blocks",
                        cursor, end, e, halved
                    );
                    metrics::increment_chunk_shrinks();
                    span = halved;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(logs)
    }

    fn check_range(&self, from_block: u64, to_block: u64) -> Result<(), FetchError> {
        if from_block > to_block {
            return Err(FetchError::InvalidRange {
                from_block,
                to_block,
            });
        }
        let blocks = to_block - from_block + 1;
        if blocks > self.max_range {
            return Err(FetchError::RangeTooLarge {
                from_block,
                to_block,
                blocks,
                max_range: self.max_range,
            });
        }
        Ok(())
    }
}
