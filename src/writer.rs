//! # Ingestion Writer
//!
//! Persists decoded events. Transfers and swaps are appended; pools are keyed on
//! `(dex, pool)` and only the first sighting is kept. Each write autocommits.

use crate::database::{DbError, DbPool};
use crate::metrics;
use crate::types::conversions::{address_to_string, hash_to_string};
use crate::types::{DecodedEvent, PoolCreatedEvent, SwapEvent, TransferEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// Pool already registered; the stored row was left untouched.
    Duplicate,
    /// Unrecognized event, nothing written.
    Skipped,
}

#[derive(Clone)]
pub struct IngestionWriter {
    pool: DbPool,
}

impl IngestionWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn write(&self, event: &DecodedEvent) -> Result<WriteOutcome, DbError> {
        let outcome = match event {
            DecodedEvent::Transfer(transfer) => self.insert_transfer(transfer).await?,
            DecodedEvent::PoolCreated(pool) => self.upsert_pool(pool).await?,
            DecodedEvent::Swap(swap) => self.insert_swap(swap).await?,
            DecodedEvent::Unrecognized => return Ok(WriteOutcome::Skipped),
        };
        if outcome == WriteOutcome::Inserted {
            metrics::increment_events_written(event.kind());
        }
        Ok(outcome)
    }

    async fn insert_transfer(&self, t: &TransferEvent) -> Result<WriteOutcome, DbError> {
        sqlx::query(
            r#"INSERT INTO erc20_transfers (block, ts, token, "from", "to", value, tx_hash, log_index)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(t.block as i64)
        .bind(t.timestamp.timestamp())
        .bind(address_to_string(t.token))
        .bind(address_to_string(t.from))
        .bind(address_to_string(t.to))
        .bind(t.value.to_string())
        .bind(hash_to_string(t.tx_hash))
        .bind(t.log_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|source| DbError::Write {
            table: "erc20_transfers",
            source,
        })?;
        Ok(WriteOutcome::Inserted)
    }

    async fn upsert_pool(&self, p: &PoolCreatedEvent) -> Result<WriteOutcome, DbError> {
        let result = sqlx::query(
            "INSERT INTO pools (dex, pool, token0, token1, fee_tier, first_block, first_ts)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (dex, pool) DO NOTHING",
        )
        .bind(p.dex.as_str())
        .bind(address_to_string(p.pool))
        .bind(address_to_string(p.token0))
        .bind(address_to_string(p.token1))
        .bind(p.fee_tier as i64)
        .bind(p.first_block as i64)
        .bind(p.first_timestamp.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|source| DbError::Write {
            table: "pools",
            source,
        })?;

        if result.rows_affected() == 0 {
            Ok(WriteOutcome::Duplicate)
        } else {
            Ok(WriteOutcome::Inserted)
        }
    }

    async fn insert_swap(&self, s: &SwapEvent) -> Result<WriteOutcome, DbError> {
        sqlx::query(
            "INSERT INTO dex_events (block, ts, dex, pool, event, tx_hash, log_index, sender, recipient, amount0, amount1)
             VALUES (?, ?, ?, ?, 'swap', ?, ?, ?, ?, ?, ?)",
        )
        .bind(s.block as i64)
        .bind(s.timestamp.timestamp())
        .bind(s.dex.as_str())
        .bind(address_to_string(s.pool))
        .bind(hash_to_string(s.tx_hash))
        .bind(s.log_index as i64)
        .bind(address_to_string(s.sender))
        .bind(address_to_string(s.recipient))
        .bind(s.amount0.to_string())
        .bind(s.amount1.to_string())
        .execute(&self.pool)
        .await
        .map_err(|source| DbError::Write {
            table: "dex_events",
            source,
        })?;
        Ok(WriteOutcome::Inserted)
    }
}
