//! # Head Subscription
//!
//! Streams new chain heads from `eth_subscribe("newHeads")` into an mpsc channel.
//!
//! - Reconnects with exponential backoff (reset after a connection that delivered heads)
//! - Stops when the token is cancelled or the receiver is dropped; dropping the
//!   subscription stream unsubscribes on the node

use crate::settings::Tail as TailSettings;
use crate::types::conversions::timestamp_from_unix;
use crate::types::BlockHead;
use anyhow::{Context, Result};
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Block, H256};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_settings(settings: &TailSettings) -> Self {
        Self {
            initial: Duration::from_millis(settings.reconnect_delay_ms.max(1)),
            max: Duration::from_secs(settings.max_reconnect_delay_secs.max(1)),
        }
    }

    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Why a connection stopped forwarding heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    ReceiverClosed,
    /// Node closed the stream; worth reconnecting.
    Closed { forwarded: u64 },
}

/// Spawns the subscription loop. The task ends on cancellation or when `tx` has no receiver.
pub fn spawn(
    ws_url: String,
    tx: mpsc::Sender<BlockHead>,
    cancel: CancellationToken,
    backoff: Backoff,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut delay = backoff.initial;
        loop {
            match forward_heads(&ws_url, &tx, &cancel).await {
                Ok(StreamEnd::Cancelled) => {
                    info!("🛑 [HeadSubscription] Cancelled, unsubscribed from newHeads");
                    return;
                }
                Ok(StreamEnd::ReceiverClosed) => {
                    info!("[HeadSubscription] Consumer gone, stopping");
                    return;
                }
                Ok(StreamEnd::Closed { forwarded }) => {
                    warn!(
                        "⚠️ [HeadSubscription] Stream ended after {} heads. Reconnecting in {:?}...",
                        forwarded, delay
                    );
                    if forwarded > 0 {
                        delay = backoff.initial;
                    }
                }
                Err(e) => {
                    error!(
                        "❌ [HeadSubscription] {:#}. Reconnecting in {:?}...",
                        e, delay
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }
            delay = backoff.next(delay);
        }
    })
}

async fn forward_heads(
    ws_url: &str,
    tx: &mpsc::Sender<BlockHead>,
    cancel: &CancellationToken,
) -> Result<StreamEnd> {
    info!("🔌 [HeadSubscription] Connecting to {}", ws_url);
    let provider = tokio::select! {
        _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
        provider = Provider::<Ws>::connect(ws_url) => {
            provider.context("Failed to connect to WebSocket provider")?
        }
    };

    let mut stream = provider
        .subscribe_blocks()
        .await
        .context("Failed to subscribe to newHeads")?;
    info!("✅ [HeadSubscription] Subscribed to newHeads");

    let mut forwarded = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            block = stream.next() => match block {
                Some(block) => {
                    let Some(head) = head_from_block(&block) else {
                        debug!("[HeadSubscription] Ignoring header without number: {:?}", block.hash);
                        continue;
                    };
                    debug!("📡 [HeadSubscription] New head {}", head.number);
                    if tx.send(head).await.is_err() {
                        return Ok(StreamEnd::ReceiverClosed);
                    }
                    forwarded += 1;
                }
                None => return Ok(StreamEnd::Closed { forwarded }),
            }
        }
    }
}

/// `None` for pending headers or out-of-range timestamps.
pub fn head_from_block(block: &Block<H256>) -> Option<BlockHead> {
    let number = block.number?.as_u64();
    if block.timestamp.bits() > 64 {
        return None;
    }
    let timestamp = timestamp_from_unix(block.timestamp.low_u64()).ok()?;
    Some(BlockHead { number, timestamp })
}
