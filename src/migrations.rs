//! Versioned schema migrations for the ingestion store.
//!
//! Applied versions are recorded in `schema_migrations`; each pending migration runs
//! in its own transaction, so re-running the list is a no-op.

use crate::database::{DbError, DbPool};
use chrono::Utc;
use log::{debug, info};
use sqlx::Row;

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_tables",
        statements: &[
            r#"CREATE TABLE IF NOT EXISTS erc20_transfers (
                block     INTEGER NOT NULL,
                ts        INTEGER NOT NULL,
                token     TEXT    NOT NULL,
                "from"    TEXT    NOT NULL,
                "to"      TEXT    NOT NULL,
                value     TEXT    NOT NULL,
                tx_hash   TEXT    NOT NULL,
                log_index INTEGER NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS pools (
                dex         TEXT    NOT NULL,
                pool        TEXT    NOT NULL,
                token0      TEXT    NOT NULL,
                token1      TEXT    NOT NULL,
                fee_tier    INTEGER NOT NULL,
                first_block INTEGER NOT NULL,
                first_ts    INTEGER NOT NULL,
                PRIMARY KEY (dex, pool)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS dex_events (
                block     INTEGER NOT NULL,
                ts        INTEGER NOT NULL,
                dex       TEXT    NOT NULL,
                pool      TEXT    NOT NULL,
                event     TEXT    NOT NULL,
                tx_hash   TEXT    NOT NULL,
                log_index INTEGER NOT NULL,
                sender    TEXT    NOT NULL,
                recipient TEXT    NOT NULL,
                amount0   TEXT    NOT NULL,
                amount1   TEXT    NOT NULL
            )"#,
        ],
    },
    Migration {
        version: 2,
        name: "time_and_block_indexes",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_erc20_transfers_ts ON erc20_transfers (ts)",
            "CREATE INDEX IF NOT EXISTS idx_erc20_transfers_block ON erc20_transfers (block)",
            "CREATE INDEX IF NOT EXISTS idx_erc20_transfers_token ON erc20_transfers (token)",
            "CREATE INDEX IF NOT EXISTS idx_dex_events_ts ON dex_events (ts)",
            "CREATE INDEX IF NOT EXISTS idx_dex_events_block ON dex_events (block)",
            "CREATE INDEX IF NOT EXISTS idx_dex_events_pool ON dex_events (pool)",
        ],
    },
];

const CREATE_REGISTRY: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    name       TEXT    NOT NULL,
    applied_at INTEGER NOT NULL
)";

/// Applies every migration not yet recorded. Returns the versions applied by this call.
pub async fn run_migrations(pool: &DbPool) -> Result<Vec<i64>, DbError> {
    sqlx::query(CREATE_REGISTRY)
        .execute(pool)
        .await
        .map_err(|source| DbError::Migration {
            version: 0,
            name: "schema_migrations",
            source,
        })?;

    let current = current_version(pool).await?;
    let mut applied = Vec::new();

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(pool, migration)
            .await
            .map_err(|source| DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        info!(
            "✅ [Migrations] Applied v{:03} {}",
            migration.version, migration.name
        );
        applied.push(migration.version);
    }

    if applied.is_empty() {
        debug!("[Migrations] Schema up to date at v{:03}", current);
    }
    Ok(applied)
}

/// Highest applied version, 0 for a fresh store.
pub async fn current_version(pool: &DbPool) -> Result<i64, DbError> {
    let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(row.try_get::<i64, _>("version")?)
}

async fn apply(pool: &DbPool, migration: &Migration) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in migration.statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}
