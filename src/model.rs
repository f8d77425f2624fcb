//! Core data model.
//!
//! A lead is one prospective customer moving through the pipeline. It has
//! identity (the upstream lead-gen id), lifecycle status, an attempt count, the
//! contact data fetched from the source, and a set of monotonic delivery flags.

pub mod assignment;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use assignment::{Agent, AgentRoster, Assignment, LedgerStats};

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A lead tracked by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Internal identifier, assigned on first enqueue.
    pub id: LeadId,

    /// Identifier from the lead-gen source. Unique across the store.
    pub external_id: String,

    pub status: LeadStatus,

    /// Number of processing attempts so far.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,

    /// Most recent failure reason.
    pub last_error: Option<String>,

    /// Webhook body that announced this lead, stored verbatim.
    pub raw_payload: Option<serde_json::Value>,

    /// Contact data. Cached permanently after the first successful fetch.
    pub fetched_data: Option<LeadData>,

    pub results: LeadResults,
}

impl Lead {
    /// Name used to match this lead against spreadsheet rows, if known.
    pub fn contact_name(&self) -> Option<&str> {
        self.fetched_data.as_ref().map(|d| d.name.as_str())
    }
}

/// Newtype for internal lead IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub Uuid);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Waiting for a processing attempt.
    Pending,
    /// An attempt has started and not yet recorded an outcome.
    Processing,
    /// Contact data was fetched and the lead was delivered (best effort).
    Completed,
    /// Retries exhausted. Only an operator reset brings it back.
    Failed,
}

impl LeadStatus {
    /// Can the store move a lead from self to `to`?
    ///
    /// The operator reset path does not go through this check.
    pub fn can_transition_to(self, to: LeadStatus) -> bool {
        use LeadStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Completed)      // reconciler repair
                | (Processing, Completed)
                | (Processing, Pending)     // retry
                | (Processing, Failed)      // exhausted
                | (Failed, Processing)      // still under the retry ceiling
                | (Failed, Completed)       // reconciler repair
                | (Completed, Completed) // reconciler re-record
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Processing => "processing",
            LeadStatus::Completed => "completed",
            LeadStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeadStatus::Pending),
            "processing" => Ok(LeadStatus::Processing),
            "completed" => Ok(LeadStatus::Completed),
            "failed" => Ok(LeadStatus::Failed),
            _ => Err(crate::error::Error::Other(format!("unknown lead status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Contact data + result flags
// ---------------------------------------------------------------------------

/// Contact data fetched from the lead-gen source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadData {
    pub name: String,
    pub phone: String,
    pub city: String,
    pub product: String,
}

/// Per-lead delivery flags. Each flag only ever goes from false to true,
/// except through an explicit reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadResults {
    pub data_fetched: bool,
    pub notified_primary: bool,
    pub notified_agent: bool,
    pub recorded: bool,
}

// ---------------------------------------------------------------------------
// Queue results
// ---------------------------------------------------------------------------

/// What happened when a lead was enqueued.
#[derive(Debug)]
pub enum EnqueueResult {
    /// New lead stored as pending.
    Created(Box<Lead>),
    /// The external id was already queued; the stored record is returned unchanged.
    Existing(Box<Lead>),
}

impl EnqueueResult {
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }

    pub fn into_lead(self) -> Lead {
        match self {
            EnqueueResult::Created(lead) | EnqueueResult::Existing(lead) => *lead,
        }
    }
}

/// Counts by status across the whole queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Failed leads still under the retry ceiling.
    pub retryable: u64,
}
