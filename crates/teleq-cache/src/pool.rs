//! SQLite pool for the event store
//!
//! The event table is append-heavy: producers insert from many tasks while
//! the flush worker reads batches and deletes acknowledged rows. WAL lets
//! those reads proceed during an insert transaction, and
//! `synchronous = NORMAL` keeps committed events across a process crash
//! without an fsync per enqueue. The schema is applied on every open.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::CacheError;

/// Schema migrations in application order
const MIGRATIONS: &[(&str, &str)] = &[(
    "20260301_events",
    include_str!("migrations/20260301_events.sql"),
)];

/// Connections for an on-disk queue: one writer plus concurrent readers
const FILE_POOL_CONNECTIONS: u32 = 5;

/// How long a writer waits on a locked database before failing the enqueue
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool backing [`SqliteEventQueue`](crate::SqliteEventQueue)
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the queue database at `db_path`
    ///
    /// Missing parent directories are created. Migrations run before the
    /// pool is returned.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        ensure_parent_dir(db_path)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_CONNECTIONS)
            .connect_with(file_options(db_path))
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Cannot open event store {}: {e}",
                    db_path.display()
                ))
            })?;

        Self::run_migrations(&pool).await?;
        tracing::info!(path = %db_path.display(), "Event store opened");

        Ok(Self { pool })
    }

    /// Opens a throwaway in-memory store
    ///
    /// An in-memory SQLite database lives and dies with its connection, so
    /// the pool is pinned to exactly one. Callers must not hold a
    /// transaction open while issuing another query on the same pool.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("Cannot open in-memory store: {e}")))?;

        Self::run_migrations(&pool).await?;
        tracing::debug!("In-memory event store opened");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for in-flight queries, then closes every connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Applies the schema; every statement is `IF NOT EXISTS`
    async fn run_migrations(pool: &SqlitePool) -> Result<(), CacheError> {
        for (name, sql) in MIGRATIONS {
            sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
                CacheError::MigrationFailed(format!("Migration {name} failed: {e}"))
            })?;
        }
        tracing::debug!(count = MIGRATIONS.len(), "Event store schema up to date");
        Ok(())
    }
}

fn file_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
}

fn ensure_parent_dir(db_path: &Path) -> Result<(), CacheError> {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Cannot create directory {} for the event store: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}
