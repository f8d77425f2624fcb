//! Round-robin assignment types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sales agent that leads can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Short code stored in the ledger and shown in messages (e.g. "VRJ").
    pub code: String,
    /// Messaging channel that receives this agent's directive messages.
    pub channel: Option<String>,
}

impl Agent {
    pub fn new(code: impl Into<String>, channel: Option<String>) -> Self {
        Self {
            code: code.into(),
            channel,
        }
    }
}

/// The fixed pair of agents leads alternate between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRoster {
    first: Agent,
    second: Agent,
}

impl AgentRoster {
    pub fn new(first: Agent, second: Agent) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &Agent {
        &self.first
    }

    pub fn second(&self) -> &Agent {
        &self.second
    }

    pub fn agents(&self) -> [&Agent; 2] {
        [&self.first, &self.second]
    }

    /// Agent that follows `last` in the alternation.
    ///
    /// Any code other than the first agent's (including one dropped from the
    /// roster since it was stored) hands the turn to the first agent.
    pub fn next_after(&self, last: &str) -> &Agent {
        if last == self.first.code {
            &self.second
        } else {
            &self.first
        }
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::new(Agent::new("VRJ", None), Agent::new("DLAB", None))
    }
}

/// Result of one round-robin assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub agent: String,
    /// Channel to notify the assigned agent on, if configured.
    pub destination: Option<String>,
}

/// Snapshot of the assignment ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub last_agent: String,
    pub counters: BTreeMap<String, u64>,
    pub total: u64,
    pub last_updated_at: Option<DateTime<Utc>>,
}
