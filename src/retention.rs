//! # Retention Sweeper
//!
//! Deletes time-partitioned rows (`erc20_transfers`, `dex_events`) whose block time is
//! strictly older than the cutoff. The `pools` registry is never swept.

use crate::database::{DbError, DbPool, Table};
use crate::metrics;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, info};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Tables carrying a `ts` column.
pub const SWEPT_TABLES: [Table; 2] = [Table::Erc20Transfers, Table::DexEvents];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub transfers_deleted: u64,
    pub dex_events_deleted: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.transfers_deleted + self.dex_events_deleted
    }
}

#[derive(Clone)]
pub struct RetentionSweeper {
    pool: DbPool,
}

impl RetentionSweeper {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Sweeps everything older than `retention_days` before now.
    pub async fn run(&self, retention_days: u32) -> Result<SweepReport, DbError> {
        self.sweep_before(cutoff_for(Utc::now(), retention_days)).await
    }

    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> Result<SweepReport, DbError> {
        let mut report = SweepReport {
            cutoff,
            transfers_deleted: 0,
            dex_events_deleted: 0,
        };

        for table in SWEPT_TABLES {
            let deleted = sqlx::query(&format!("DELETE FROM {} WHERE ts < ?", table.as_str()))
                .bind(cutoff.timestamp())
                .execute(&self.pool)
                .await?
                .rows_affected();
            metrics::increment_retention_deleted(table.as_str(), deleted);
            match table {
                Table::Erc20Transfers => report.transfers_deleted = deleted,
                Table::DexEvents => report.dex_events_deleted = deleted,
                Table::Pools => {}
            }
        }

        info!(
            "🧹 [Retention] Cutoff {}: deleted {} transfers, {} dex events",
            cutoff.to_rfc3339(),
            report.transfers_deleted,
            report.dex_events_deleted
        );
        Ok(report)
    }

    /// Sweeps every `interval` until `cancel` fires. The first sweep runs immediately.
    pub fn spawn_periodic(
        self,
        interval: Duration,
        retention_days: u32,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("🛑 [Retention] Periodic sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run(retention_days).await {
                            error!("❌ [Retention] Sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

/// `now - days`, clamped to the earliest representable time.
fn cutoff_for(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(ChronoDuration::days(i64::from(retention_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
