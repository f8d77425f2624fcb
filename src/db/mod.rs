//! Database connection pool, migrations, and health check.
//!
//! One SQLite database holds both durable records: the lead queue and the
//! assignment ledger. Each is wrapped by its own store type, which serializes
//! its read-modify-write cycles.

pub mod leads;
pub mod ledger;

pub use leads::LeadQueue;
pub use ledger::AssignmentLedger;

use std::str::FromStr;

use crate::error::Result;
use crate::model::AgentRoster;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// Database handle. Owns the connection pool shared by both stores.
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Connect to SQLite, creating the database file if needed.
    ///
    /// In-memory URLs get a single connection that is never recycled, since
    /// every connection to `:memory:` would otherwise see its own database.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    /// Fresh in-memory database with migrations applied (for tests and dry runs).
    pub async fn in_memory() -> Result<Self> {
        let db = Self::connect("sqlite::memory:").await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Lead queue store over this database.
    ///
    /// Build it once and clone the handle; clones share the writer lock.
    pub fn lead_queue(&self, max_retries: u32) -> LeadQueue {
        LeadQueue::new(self.pool.clone(), max_retries)
    }

    /// Assignment ledger over this database. Same sharing rule as [`Db::lead_queue`].
    pub fn assignment_ledger(&self, roster: AgentRoster) -> AssignmentLedger {
        AssignmentLedger::new(self.pool.clone(), roster)
    }

    /// Close the pool, waiting for in-flight statements.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
