//! adsync Cache - Local user store
//!
//! SQLite-backed persistence for:
//! - Local user records and their flat metadata
//! - History of finished synchronization batches
//!
//! ## Architecture
//!
//! This crate implements the `IUserStore` and `IReportSink` ports from
//! `adsync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteUserStore`] - `IUserStore` and `IReportSink` implementation
//! - [`CacheError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use adsync_cache::{DatabasePool, SqliteUserStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/adsync/adsync.db")).await?;
//! let store = SqliteUserStore::new(pool.pool().clone());
//! // Use store as IUserStore / IReportSink...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteUserStore;

/// Errors that can occur during store operations
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

    /// A stored row could not be turned back into a domain value
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
