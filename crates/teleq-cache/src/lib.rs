//! teleq Cache - Durable event queue
//!
//! SQLite-based storage for telemetry events produced while offline:
//! - Priority-ordered, non-destructive dequeue
//! - Retry accounting with a drop-after-cap policy
//! - Age and size based pruning
//!
//! ## Architecture
//!
//! This crate implements the `IEventQueue` port from `teleq-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteEventQueue`] - Full `IEventQueue` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use teleq_cache::{DatabasePool, SqliteEventQueue};
//! use teleq_core::domain::RetentionPolicy;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/teleq/events.db")).await?;
//! let queue = SqliteEventQueue::new(pool.pool().clone(), RetentionPolicy::default());
//! // Use queue as IEventQueue...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteEventQueue;

use teleq_core::domain::DomainError;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be converted back into a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<DomainError> for CacheError {
    fn from(e: DomainError) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
