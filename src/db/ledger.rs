//! Round-robin assignment ledger.
//!
//! A singleton turn record plus per-agent counters. Each assignment reads the
//! last agent, flips to the other one and bumps its counter inside a single
//! transaction, under a writer lock so two callers can never observe the same
//! turn.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::model::{AgentRoster, Assignment, LedgerStats};
use crate::telemetry::metrics;

#[derive(Clone)]
pub struct AssignmentLedger {
    pool: SqlitePool,
    roster: AgentRoster,
    write_lock: Arc<Mutex<()>>,
}

impl AssignmentLedger {
    pub fn new(pool: SqlitePool, roster: AgentRoster) -> Self {
        Self {
            pool,
            roster,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Pick the next agent, persist the turn, and return the agent plus its
    /// notification channel.
    ///
    /// The ledger is created on first use with the second roster agent as the
    /// last one, so the very first lead goes to the first agent.
    pub async fn assign_next(&self) -> Result<Assignment> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let last: Option<(String,)> =
            sqlx::query_as("SELECT last_agent FROM assignment_ledger WHERE id = 1")
                .fetch_optional(&mut *tx)
                .await?;
        let last = last.map_or_else(|| self.roster.second().code.clone(), |(code,)| code);

        let next = self.roster.next_after(&last);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO assignment_ledger (id, last_agent, last_updated_at) VALUES (1, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                last_agent = excluded.last_agent,
                last_updated_at = excluded.last_updated_at",
        )
        .bind(&next.code)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO assignment_counters (agent, assigned) VALUES (?, 1)
             ON CONFLICT (agent) DO UPDATE SET assigned = assigned + 1",
        )
        .bind(&next.code)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(agent = %next.code, previous = %last, "lead assigned");
        metrics::assignments().add(1, &[KeyValue::new("agent", next.code.clone())]);

        Ok(Assignment {
            agent: next.code.clone(),
            destination: next.channel.clone(),
        })
    }

    /// Read the ledger without creating it.
    ///
    /// Both roster agents always appear in `counters`; agents that were
    /// assigned under an older roster are kept too.
    pub async fn stats(&self) -> Result<LedgerStats> {
        let turn: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT last_agent, last_updated_at FROM assignment_ledger WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT agent, assigned FROM assignment_counters")
                .fetch_all(&self.pool)
                .await?;

        let mut counters: BTreeMap<String, u64> = self
            .roster
            .agents()
            .into_iter()
            .map(|a| (a.code.clone(), 0))
            .collect();
        for (agent, assigned) in rows {
            counters.insert(agent, assigned as u64);
        }
        let total = counters.values().sum();

        let (last_agent, last_updated_at) = match turn {
            Some((agent, at)) => (agent, Some(at)),
            None => (self.roster.second().code.clone(), None),
        };

        Ok(LedgerStats {
            last_agent,
            counters,
            total,
            last_updated_at,
        })
    }
}
