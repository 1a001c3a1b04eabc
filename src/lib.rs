//! # Chain Ingestor
//!
//! Ingests ERC-20 transfers, Uniswap V2/V3 pool creations and swaps from an
//! Ethereum-compatible node into a local SQLite store.
//!
//! ## Overview
//!
//! - **Backfill**: bounded history (the last N days up to the head), in sequential batches
//! - **Tail**: one block at a time from a `newHeads` subscription, with small-gap catch-up
//! - **Retention**: deletes transfers and swaps older than the retention window
//!
//! ## Architecture
//!
//! ### Chain access
//! [`rpc_gateway`] speaks JSON-RPC over HTTP behind the [`rpc_gateway::RpcClient`] trait.
//! [`log_fetcher`] splits `eth_getLogs` ranges into windows and halves them on overload.
//! [`head_subscription`] streams new heads over WebSocket.
//!
//! ### Processing
//! [`decoder`] maps raw logs onto typed events and never fails; [`writer`] persists them.
//! [`pipeline`] glues fetch, decode and write for a block range.
//!
//! ### Jobs
//! [`backfill`], [`tail`] and [`retention`] share one [`context::IngestionContext`].

// Core Types
/// Block ranges, raw logs and decoded events
pub mod types;

// Chain Access
/// JSON-RPC client with method deny-list
pub mod rpc_gateway;
/// Windowed `eth_getLogs` with adaptive shrinking
pub mod log_fetcher;
/// `newHeads` WebSocket subscription
pub mod head_subscription;

// Processing
/// Event signatures and log decoding
pub mod decoder;
/// Fetch, decode and write for a block range
pub mod pipeline;
/// Event persistence
pub mod writer;

// Storage
/// SQLite store
pub mod database;
/// Versioned schema migrations
pub mod migrations;

// Jobs
/// Historical ingestion
pub mod backfill;
/// Live head following
pub mod tail;
/// Time-based deletion
pub mod retention;
/// Shared job dependencies
pub mod context;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;
/// General utilities
pub mod utils;

// Re-exports for convenience
pub use backfill::{BackfillJob, BackfillReport};
pub use context::IngestionContext;
pub use retention::RetentionSweeper;
pub use settings::Settings;
pub use tail::{TailJob, TailReport};
