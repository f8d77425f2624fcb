//! Lead queue operations: idempotent enqueue, attempt tracking, outcome merge.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::metrics;

const LEAD_COLUMNS: &str = "id, external_id, status, attempts, created_at, last_attempt_at, \
     processed_at, last_error, raw_payload, fetched_data, data_fetched, notified_primary, \
     notified_agent, recorded";

/// Reason stamped on leads reclaimed from a stuck `processing` state.
pub const ABANDONED_ATTEMPT: &str = "attempt abandoned while processing";

/// Validate a status transition, returning an error if disallowed.
fn validate_transition(from: LeadStatus, to: LeadStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

fn record_transition(from: LeadStatus, to: LeadStatus) {
    metrics::lead_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}

/// Durable lead queue.
///
/// Every mutating method holds the writer lock for its whole read-check-write
/// cycle. Clones share the lock, so build one and hand out clones.
#[derive(Clone)]
pub struct LeadQueue {
    pool: SqlitePool,
    max_retries: u32,
    write_lock: Arc<Mutex<()>>,
}

impl LeadQueue {
    pub fn new(pool: SqlitePool, max_retries: u32) -> Self {
        Self {
            pool,
            max_retries,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Attempt ceiling: a lead whose fetch failed this many times is `failed`.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Round-trip to the database.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a lead unless its external id is already queued.
    pub async fn enqueue(
        &self,
        external_id: &str,
        raw_payload: Option<serde_json::Value>,
    ) -> Result<EnqueueResult> {
        let _guard = self.write_lock.lock().await;

        let raw = raw_payload
            .map(|v| serde_json::to_string(&v))
            .transpose()
            .map_err(|e| Error::Other(format!("serialize webhook payload: {e}")))?;

        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO leads (id, external_id, status, attempts, created_at, raw_payload)
             VALUES (?, ?, 'pending', 0, ?, ?)
             ON CONFLICT (external_id) DO NOTHING
             RETURNING id",
        )
        .bind(LeadId::new().to_string())
        .bind(external_id)
        .bind(Utc::now())
        .bind(raw)
        .fetch_optional(&self.pool)
        .await?;

        let lead = self.require(external_id).await?;

        if inserted.is_none() {
            info!(external_id, status = %lead.status, "lead already queued, enqueue is a no-op");
            metrics::leads_enqueued().add(1, &[KeyValue::new("result", "existing")]);
            return Ok(EnqueueResult::Existing(Box::new(lead)));
        }

        info!(external_id, id = %lead.id, "lead queued");
        metrics::leads_enqueued().add(1, &[KeyValue::new("result", "created")]);
        Ok(EnqueueResult::Created(Box::new(lead)))
    }

    /// Get a lead by its external id.
    pub async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Lead>> {
        let row: Option<LeadRow> = sqlx::query_as(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE external_id = ?"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LeadRow::try_into_lead).transpose()
    }

    /// Like [`LeadQueue::get_by_external_id`], but absence is an error.
    pub async fn require(&self, external_id: &str) -> Result<Lead> {
        self.get_by_external_id(external_id)
            .await?
            .ok_or_else(|| Error::NotFound(external_id.to_string()))
    }

    /// Leads eligible for a processing attempt: pending ones first, then failed
    /// ones still under the retry ceiling, each group oldest first.
    pub async fn list_actionable(&self) -> Result<Vec<Lead>> {
        let rows: Vec<LeadRow> = sqlx::query_as(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE status = 'pending' OR (status = 'failed' AND attempts < ?)
             ORDER BY CASE status WHEN 'pending' THEN 0 ELSE 1 END, seq ASC"
        ))
        .bind(self.max_retries as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LeadRow::try_into_lead).collect()
    }

    /// All failed leads, oldest first.
    pub async fn list_failed(&self) -> Result<Vec<Lead>> {
        self.list_by_status(LeadStatus::Failed, None).await
    }

    /// Leads with the given status, oldest first. `None` means no limit.
    pub async fn list_by_status(&self, status: LeadStatus, limit: Option<i64>) -> Result<Vec<Lead>> {
        let rows: Vec<LeadRow> = sqlx::query_as(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE status = ? ORDER BY seq ASC LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LeadRow::try_into_lead).collect()
    }

    /// Most recently created leads first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Lead>> {
        let rows: Vec<LeadRow> = sqlx::query_as(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC, seq DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LeadRow::try_into_lead).collect()
    }

    /// Every lead in insertion order.
    pub async fn list_all(&self) -> Result<Vec<Lead>> {
        let rows: Vec<LeadRow> =
            sqlx::query_as(&format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY seq ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(LeadRow::try_into_lead).collect()
    }

    /// Start an attempt: bump `attempts`, move to `processing`, stamp the time.
    ///
    /// Must run before any externally visible side effect of the attempt, so a
    /// crash mid-attempt still counts it.
    pub async fn mark_attempt_started(&self, external_id: &str) -> Result<Lead> {
        let _guard = self.write_lock.lock().await;

        let lead = self.require(external_id).await?;
        validate_transition(lead.status, LeadStatus::Processing)?;

        sqlx::query(
            "UPDATE leads SET status = 'processing', attempts = attempts + 1, last_attempt_at = ?
             WHERE external_id = ?",
        )
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        record_transition(lead.status, LeadStatus::Processing);
        self.require(external_id).await
    }

    /// Record the outcome of an attempt (or a reconciler repair).
    ///
    /// Flags are OR-merged into the stored ones and never cleared here.
    /// `completed` stamps `processed_at` and clears any earlier error.
    pub async fn record_outcome(
        &self,
        external_id: &str,
        status: LeadStatus,
        flags: LeadResults,
        error: Option<&str>,
    ) -> Result<Lead> {
        let _guard = self.write_lock.lock().await;

        let lead = self.require(external_id).await?;
        validate_transition(lead.status, status)?;

        let completed = status == LeadStatus::Completed;
        let processed_at = completed.then(Utc::now);

        sqlx::query(
            "UPDATE leads SET
                status = ?,
                data_fetched = data_fetched OR ?,
                notified_primary = notified_primary OR ?,
                notified_agent = notified_agent OR ?,
                recorded = recorded OR ?,
                last_error = CASE WHEN ? THEN NULL ELSE COALESCE(?, last_error) END,
                processed_at = COALESCE(?, processed_at)
             WHERE external_id = ?",
        )
        .bind(status.as_str())
        .bind(flags.data_fetched)
        .bind(flags.notified_primary)
        .bind(flags.notified_agent)
        .bind(flags.recorded)
        .bind(completed)
        .bind(error)
        .bind(processed_at)
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        record_transition(lead.status, status);
        self.require(external_id).await
    }

    /// Operator reset: back to `pending` with zero attempts, no error, no flags.
    ///
    /// Fetched contact data stays cached.
    pub async fn reset_for_retry(&self, external_id: &str) -> Result<Lead> {
        let _guard = self.write_lock.lock().await;

        let lead = self.require(external_id).await?;

        sqlx::query(
            "UPDATE leads SET status = 'pending', attempts = 0, last_error = NULL,
                data_fetched = 0, notified_primary = 0, notified_agent = 0, recorded = 0
             WHERE external_id = ?",
        )
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        info!(external_id, from = %lead.status, "lead reset for retry");
        record_transition(lead.status, LeadStatus::Pending);
        self.require(external_id).await
    }

    /// Cache fetched contact data. A lead's first stored data is kept.
    pub async fn store_fetched_data(&self, external_id: &str, data: &LeadData) -> Result<Lead> {
        let _guard = self.write_lock.lock().await;

        let json = serde_json::to_string(data)
            .map_err(|e| Error::Other(format!("serialize lead data: {e}")))?;

        let affected = sqlx::query(
            "UPDATE leads SET fetched_data = COALESCE(fetched_data, ?) WHERE external_id = ?",
        )
        .bind(json)
        .bind(external_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(Error::NotFound(external_id.to_string()));
        }
        self.require(external_id).await
    }

    /// Return leads stuck in `processing` to the retry path.
    ///
    /// A lead counts as stuck when its last attempt started more than
    /// `stale_after` ago. It goes back to `pending` if it is still under the
    /// retry ceiling, otherwise to `failed`. The abandoned attempt stays counted.
    pub async fn reclaim_stale(&self, stale_after: Duration) -> Result<Vec<Lead>> {
        let _guard = self.write_lock.lock().await;

        let cutoff = Utc::now()
            - chrono::Duration::from_std(stale_after)
                .map_err(|e| Error::Other(format!("stale_after out of range: {e}")))?;

        let processing = self.list_by_status(LeadStatus::Processing, None).await?;
        let stale: Vec<Lead> = processing
            .into_iter()
            .filter(|lead| lead.last_attempt_at.is_none_or(|at| at < cutoff))
            .collect();

        let mut reclaimed = Vec::with_capacity(stale.len());
        for lead in stale {
            let to = if lead.attempts < self.max_retries {
                LeadStatus::Pending
            } else {
                LeadStatus::Failed
            };

            sqlx::query(
                "UPDATE leads SET status = ?, last_error = ?
                 WHERE external_id = ? AND status = 'processing'",
            )
            .bind(to.as_str())
            .bind(ABANDONED_ATTEMPT)
            .bind(&lead.external_id)
            .execute(&self.pool)
            .await?;

            warn!(
                external_id = %lead.external_id,
                attempts = lead.attempts,
                to = %to,
                "reclaimed lead stuck in processing"
            );
            record_transition(LeadStatus::Processing, to);
            reclaimed.push(self.require(&lead.external_id).await?);
        }

        Ok(reclaimed)
    }

    /// Counts by status, plus failed leads still under the retry ceiling.
    pub async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM leads GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as u64;
            stats.total += count;
            match status.parse::<LeadStatus>()? {
                LeadStatus::Pending => stats.pending = count,
                LeadStatus::Processing => stats.processing = count,
                LeadStatus::Completed => stats.completed = count,
                LeadStatus::Failed => stats.failed = count,
            }
        }

        let (retryable,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM leads WHERE status = 'failed' AND attempts < ?")
                .bind(self.max_retries as i64)
                .fetch_one(&self.pool)
                .await?;
        stats.retryable = retryable as u64;

        Ok(stats)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct LeadRow {
    id: String,
    external_id: String,
    status: String,
    attempts: i64,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    raw_payload: Option<String>,
    fetched_data: Option<String>,
    data_fetched: bool,
    notified_primary: bool,
    notified_agent: bool,
    recorded: bool,
}

impl LeadRow {
    fn try_into_lead(self) -> Result<Lead> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Other(format!("bad lead id {}: {e}", self.id)))?;
        let raw_payload = self
            .raw_payload
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| Error::Other(format!("bad raw payload for {}: {e}", self.external_id)))?;
        let fetched_data = self
            .fetched_data
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| Error::Other(format!("bad lead data for {}: {e}", self.external_id)))?;

        Ok(Lead {
            id: LeadId(id),
            status: self.status.parse()?,
            attempts: u32::try_from(self.attempts)
                .map_err(|_| Error::Other(format!("bad attempt count {}", self.attempts)))?,
            created_at: self.created_at,
            last_attempt_at: self.last_attempt_at,
            processed_at: self.processed_at,
            last_error: self.last_error,
            raw_payload,
            fetched_data,
            results: LeadResults {
                data_fetched: self.data_fetched,
                notified_primary: self.notified_primary,
                notified_agent: self.notified_agent,
                recorded: self.recorded,
            },
            external_id: self.external_id,
        })
    }
}
