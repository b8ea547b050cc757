//! # Local Database Module
//!
//! SQLite storage for everything that has to survive a process restart:
//! the durable queue of offline actions, the local-to-server id table and a
//! small key/value store for the session (token, user, reference caches and
//! the active operation checkpoint).
//!
//! ## Key Components
//!
//! - `LocalDatabase`: Connection pool and schema management
//! - `queue.rs`: Durable, append-only action queue
//! - `store.rs`: Key/value persistence and id mappings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use minetrack::client::local_db::LocalDatabase;
//!
//! # async fn example() -> minetrack::shared::Result<()> {
//! let db = LocalDatabase::open("/tmp/minetrack/local.db").await?;
//! let pending = db.peek_all().await?;
//! println!("{} actions waiting for the server", pending.len());
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod store;

pub use queue::{ActionKind, PendingAction, QueuedAction};
pub use store::keys;

use crate::shared::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Latest schema version; `schema.sql` is idempotent, migrations only record it
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Local database connection manager
///
/// Cheap to share behind an `Arc`; every method takes `&self` and the pool
/// serializes access, so appends never wait for a drain in progress.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Creates parent directories as needed and uses WAL mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePool::connect(&database_url).await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA temp_store=MEMORY").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;

        tracing::debug!("[QUEUE] Opened local database at {}", path.display());
        Ok(db)
    }

    /// Open a private in-memory database
    ///
    /// The pool is pinned to a single connection that never expires, since
    /// every new SQLite memory connection would start out empty.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create tables and apply pending migrations
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;

        self.run_migrations().await
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for version in (current_version.0 + 1)..=CURRENT_SCHEMA_VERSION {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
            tracing::info!("[QUEUE] Applied local schema migration {}", version);
        }

        Ok(())
    }

    /// Current schema version recorded in the database
    pub async fn schema_version(&self) -> Result<i32> {
        let version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        Ok(version.0)
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Basic statistics for diagnostics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let pending_actions: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?;

        let failed_attempts: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM offline_queue WHERE attempt_count > 0")
                .fetch_one(&self.pool)
                .await?;

        let id_mappings: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM id_mappings")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            pending_actions: pending_actions.0 as u64,
            actions_with_failed_attempts: failed_attempts.0 as u64,
            id_mappings: id_mappings.0 as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Actions waiting in the durable queue
    pub pending_actions: u64,
    /// Queued actions that already failed at least once
    pub actions_with_failed_attempts: u64,
    /// Local ids that have been resolved to server ids
    pub id_mappings: u64,
}
