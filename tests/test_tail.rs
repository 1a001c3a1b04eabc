//! Integration tests for the tail job
//!
//! Heads are pushed through an mpsc channel, the same way the WebSocket
//! subscription task feeds them in production.

mod common;

use chain_ingestor::database::{count_rows, Table};
use chain_ingestor::tail::TailJob;
use chain_ingestor::types::BlockHead;
use chrono::{TimeZone, Utc};
use common::*;
use ethers::types::Address;
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn head(number: u64) -> BlockHead {
    BlockHead {
        number,
        timestamp: Utc.timestamp_opt(block_ts(number), 0).unwrap(),
    }
}

/// Feeds `heads` then closes the channel.
fn feed(heads: &[BlockHead]) -> mpsc::Receiver<BlockHead> {
    let (tx, rx) = mpsc::channel(heads.len().max(1));
    for h in heads {
        tx.try_send(*h).unwrap();
    }
    rx
}

#[tokio::test]
async fn test_each_head_is_fetched_for_exactly_its_block() {
    let token = Address::repeat_byte(0x77);
    let chain = Arc::new(
        StubChain::new(200)
            .with_log(transfer_log(101, 0, token, 5))
            .with_log(transfer_log(102, 0, token, 6)),
    );
    let (ctx, db) = context(chain.clone(), test_settings()).await;

    let mut job = TailJob::new(ctx).with_cursor(100);
    let report = job
        .run(feed(&[head(101), head(102)]), CancellationToken::new())
        .await;

    assert_eq!(report.blocks_ingested, 2);
    assert_eq!(report.last_block, Some(102));
    assert_eq!(job.cursor(), Some(102));
    assert_eq!(count_rows(&db, Table::Erc20Transfers).await.unwrap(), 2);
    for (from, to) in chain.log_windows() {
        assert_eq!(from, to);
    }
    // head timestamps are used, no header lookups
    assert_eq!(chain.count_calls("eth_getBlockByNumber"), 0);
}

#[tokio::test]
async fn test_head_timestamp_is_stored() {
    let token = Address::repeat_byte(0x77);
    let chain = Arc::new(StubChain::new(200).with_log(transfer_log(150, 0, token, 5)));
    let (ctx, db) = context(chain, test_settings()).await;

    let announced = BlockHead {
        number: 150,
        timestamp: Utc.timestamp_opt(1_800_000_000, 0).unwrap(),
    };
    TailJob::new(ctx)
        .run(feed(&[announced]), CancellationToken::new())
        .await;

    let ts: i64 = sqlx::query("SELECT ts FROM erc20_transfers")
        .fetch_one(&db)
        .await
        .unwrap()
        .get("ts");
    assert_eq!(ts, 1_800_000_000);
}

#[tokio::test]
async fn test_stale_heads_are_skipped() {
    let chain = Arc::new(StubChain::new(200));
    let (ctx, _db) = context(chain.clone(), test_settings()).await;

    let report = TailJob::new(ctx)
        .with_cursor(100)
        .run(
            feed(&[head(101), head(101), head(99), head(102)]),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(report.heads_received, 4);
    assert_eq!(report.stale_heads, 2);
    assert_eq!(report.blocks_ingested, 2);
    assert_eq!(report.last_block, Some(102));
}

#[tokio::test]
async fn test_small_gap_is_caught_up_with_header_timestamps() {
    let token = Address::repeat_byte(0x77);
    let chain = Arc::new(StubChain::new(200).with_log(transfer_log(102, 0, token, 9)));
    let (ctx, db) = context(chain.clone(), test_settings()).await;

    let report = TailJob::new(ctx)
        .with_cursor(100)
        .run(feed(&[head(104)]), CancellationToken::new())
        .await;

    assert_eq!(report.catch_up_blocks, 3);
    assert_eq!(report.blocks_ingested, 4);
    assert_eq!(chain.count_calls("eth_getBlockByNumber"), 3);

    let blocks: Vec<u64> = chain.log_windows().iter().map(|(from, _)| *from).collect();
    let mut dedup = blocks.clone();
    dedup.dedup();
    assert_eq!(dedup, vec![101, 102, 103, 104]);

    let row = sqlx::query("SELECT block, ts FROM erc20_transfers")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("block"), 102);
    assert_eq!(row.get::<i64, _>("ts"), block_ts(102));
}

#[tokio::test]
async fn test_large_gap_is_skipped() {
    let chain = Arc::new(StubChain::new(500));
    let mut settings = test_settings();
    settings.tail.max_catch_up_blocks = 2;
    let (ctx, _db) = context(chain.clone(), settings).await;

    let report = TailJob::new(ctx)
        .with_cursor(100)
        .run(feed(&[head(110)]), CancellationToken::new())
        .await;

    assert_eq!(report.skipped_blocks, 9);
    assert_eq!(report.catch_up_blocks, 0);
    assert_eq!(report.blocks_ingested, 1);
    assert!(chain.log_windows().iter().all(|w| *w == (110, 110)));
}

#[tokio::test]
async fn test_failing_block_does_not_halt_the_loop() {
    let token = Address::repeat_byte(0x77);
    let chain = Arc::new(
        StubChain::new(200)
            .with_log(transfer_log(102, 0, token, 1))
            .failing_at(101),
    );
    let (ctx, db) = context(chain, test_settings()).await;

    let report = TailJob::new(ctx)
        .with_cursor(100)
        .run(feed(&[head(101), head(102)]), CancellationToken::new())
        .await;

    assert_eq!(report.blocks_failed, 1);
    assert_eq!(report.blocks_ingested, 1);
    assert_eq!(report.last_block, Some(102));
    assert_eq!(count_rows(&db, Table::Erc20Transfers).await.unwrap(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_an_idle_tail() {
    let chain = Arc::new(StubChain::new(200));
    let (ctx, _db) = context(chain, test_settings()).await;
    let (_tx, rx) = mpsc::channel::<BlockHead>(4);
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { TailJob::new(ctx).run(rx, cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("tail did not stop")
        .unwrap();
    assert_eq!(report.heads_received, 0);
    assert_eq!(report.last_block, None);
}
