// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

/// Registers metric descriptions. Call once at startup.
pub fn describe_metrics() {
    describe_counter!("ingest_rpc_calls_total", "JSON-RPC calls issued, by method.");
    describe_counter!("ingest_rpc_errors_total", "JSON-RPC failures, by method and kind.");
    describe_histogram!("ingest_rpc_latency_ms", "JSON-RPC round trip latency.");
    describe_counter!("ingest_chunk_shrinks_total", "Log windows halved after an overload error.");
    describe_counter!("ingest_logs_fetched_total", "Raw logs returned by eth_getLogs.");
    describe_counter!("ingest_events_written_total", "Decoded events persisted, by kind.");
    describe_counter!("ingest_decode_warnings_total", "Logs decoded with defaulted fields.");
    describe_counter!("ingest_backfill_batches_failed_total", "Backfill batches skipped after an error.");
    describe_counter!("ingest_tail_blocks_total", "Blocks handled by the tail job, by outcome.");
    describe_counter!("ingest_retention_rows_deleted_total", "Rows deleted by retention, by table.");
    describe_gauge!("ingest_tail_head_block", "Last head block seen by the tail job.");
}

pub fn increment_rpc_call(method: &str) {
    counter!("ingest_rpc_calls_total", 1, "method" => method.to_string());
}

pub fn increment_rpc_error(method: &str, kind: &'static str) {
    counter!("ingest_rpc_errors_total", 1,
             "method" => method.to_string(),
             "kind" => kind);
}

pub fn record_rpc_latency(method: &str, duration: std::time::Duration) {
    histogram!("ingest_rpc_latency_ms", duration.as_millis() as f64,
               "method" => method.to_string());
}

pub fn increment_chunk_shrinks() {
    increment_counter!("ingest_chunk_shrinks_total");
}

pub fn increment_logs_fetched(count: usize) {
    counter!("ingest_logs_fetched_total", count as u64);
}

pub fn increment_events_written(kind: &'static str) {
    counter!("ingest_events_written_total", 1, "kind" => kind);
}

pub fn increment_decode_warnings() {
    increment_counter!("ingest_decode_warnings_total");
}

pub fn increment_failed_batches() {
    increment_counter!("ingest_backfill_batches_failed_total");
}

pub fn increment_tail_blocks(outcome: &'static str) {
    counter!("ingest_tail_blocks_total", 1, "outcome" => outcome);
}

pub fn set_tail_head_block(block: u64) {
    gauge!("ingest_tail_head_block", block as f64);
}

pub fn increment_retention_deleted(table: &'static str, rows: u64) {
    counter!("ingest_retention_rows_deleted_total", rows, "table" => table);
}
