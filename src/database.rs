//! SQLite store: connection setup and read helpers.
//!
//! Writes live in [`crate::writer`], deletes in [`crate::retention`]. Every connect
//! path runs [`crate::migrations::run_migrations`] before handing out the pool.

use crate::migrations;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite connection pool type alias.
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to open store {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Migration v{version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Write to {table} failed: {source}")]
    Write {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Tables written by the ingestion jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Erc20Transfers,
    Pools,
    DexEvents,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Erc20Transfers, Table::Pools, Table::DexEvents];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Erc20Transfers => "erc20_transfers",
            Table::Pools => "pools",
            Table::DexEvents => "dex_events",
        }
    }

    fn block_column(&self) -> &'static str {
        match self {
            Table::Pools => "first_block",
            _ => "block",
        }
    }
}

/// Opens (creating if needed) the store file at `path` and migrates it.
pub async fn connect(path: &str) -> Result<DbPool, DbError> {
    let open_err = |source: sqlx::Error| DbError::Open {
        path: path.to_string(),
        source,
    };

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| open_err(sqlx::Error::Io(e)))?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(open_err)?;

    let applied = migrations::run_migrations(&pool).await?;
    info!(
        "✅ [Database] Store ready at {} ({} migrations applied)",
        path,
        applied.len()
    );
    Ok(pool)
}

/// Private in-memory store on a single pinned connection, migrated.
pub async fn connect_in_memory() -> Result<DbPool, DbError> {
    let url = "sqlite::memory:";
    let open_err = |source: sqlx::Error| DbError::Open {
        path: url.to_string(),
        source,
    };
    let options = SqliteConnectOptions::from_str(url).map_err(open_err)?;

    // The database lives as long as its only connection
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(open_err)?;

    migrations::run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn count_rows(pool: &DbPool, table: Table) -> Result<i64, DbError> {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table.as_str()))
        .fetch_one(pool)
        .await?;
    Ok(row.try_get::<i64, _>("n")?)
}

/// Highest block stored in `table`, `None` when empty.
pub async fn max_block(pool: &DbPool, table: Table) -> Result<Option<u64>, DbError> {
    let row = sqlx::query(&format!(
        "SELECT MAX({}) AS max_block FROM {}",
        table.block_column(),
        table.as_str()
    ))
    .fetch_one(pool)
    .await?;
    let max: Option<i64> = row.try_get("max_block")?;
    Ok(max.map(|b| b.max(0) as u64))
}
