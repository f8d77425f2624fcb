//! Shared fakes and wiring for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leadflow::clients::{Collaborators, LeadFetcher, Notifier, RecordKeeper, SheetRow};
use leadflow::config::WorkerConfig;
use leadflow::db::{Db, LeadQueue};
use leadflow::engine::{LeadPipeline, PipelineSettings, QueueWorker, SyncReconciler};
use leadflow::error::{Error, Result};
use leadflow::model::{Agent, AgentRoster, LeadData};

pub const PRIMARY_CHANNEL: &str = "chan-main";
pub const AGENT_A_CHANNEL: &str = "chan-a";
pub const AGENT_B_CHANNEL: &str = "chan-b";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Returns `Contact <id>` data for every id except the ones marked failing.
#[derive(Default)]
pub struct ScriptedFetcher {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn fail(&self, external_id: &str) {
        self.failing.lock().unwrap().insert(external_id.to_string());
    }

    pub fn succeed(&self, external_id: &str) {
        self.failing.lock().unwrap().remove(external_id);
    }

    pub fn calls(&self, external_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(external_id)
            .copied()
            .unwrap_or(0)
    }
}

pub fn contact_for(external_id: &str) -> LeadData {
    LeadData {
        name: format!("Contact {external_id}"),
        phone: "4620000000".to_string(),
        city: "Irapuato".to_string(),
        product: "Velaria".to_string(),
    }
}

#[async_trait]
impl LeadFetcher for ScriptedFetcher {
    async fn fetch(&self, external_id: &str) -> Result<LeadData> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(external_id.to_string())
            .or_default() += 1;

        if self.failing.lock().unwrap().contains(external_id) {
            return Err(Error::Fetch(format!("{external_id} unavailable")));
        }
        Ok(contact_for(external_id))
    }
}

/// Records every message; fails all sends while `failing` is set.
#[derive(Default)]
pub struct RecordingNotifier {
    failing: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Notify("gateway down".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

/// Spreadsheet held in memory.
#[derive(Default)]
pub struct MemorySheet {
    failing: AtomicBool,
    rows: Mutex<Vec<SheetRow>>,
}

impl MemorySheet {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<SheetRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn seed(&self, contact: &str) {
        self.rows.lock().unwrap().push(SheetRow {
            contact: contact.to_string(),
            ..SheetRow::default()
        });
    }
}

#[async_trait]
impl RecordKeeper for MemorySheet {
    async fn append_row(&self, row: &SheetRow) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Record("sheet unavailable".to_string()));
        }
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn list_all_rows(&self) -> Result<Vec<SheetRow>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Record("sheet unavailable".to_string()));
        }
        Ok(self.rows())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn test_roster() -> AgentRoster {
    AgentRoster::new(
        Agent::new("A", Some(AGENT_A_CHANNEL.to_string())),
        Agent::new("B", Some(AGENT_B_CHANNEL.to_string())),
    )
}

pub fn test_worker_config() -> WorkerConfig {
    WorkerConfig {
        interval: Duration::from_millis(20),
        lead_delay: Duration::ZERO,
        max_retries: 3,
        stale_after: Duration::from_secs(60),
    }
}

pub struct Harness {
    pub db: Db,
    pub fetcher: Arc<ScriptedFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub sheet: Arc<MemorySheet>,
    pub worker: QueueWorker,
}

impl Harness {
    pub async fn new() -> Self {
        let db = Db::in_memory().await.unwrap();
        let fetcher = Arc::new(ScriptedFetcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let sheet = Arc::new(MemorySheet::default());

        let pipeline = LeadPipeline::new(
            db.lead_queue(3),
            db.assignment_ledger(test_roster()),
            Collaborators {
                fetcher: fetcher.clone(),
                notifier: notifier.clone(),
                records: sheet.clone(),
            },
            PipelineSettings {
                primary_channel: Some(PRIMARY_CHANNEL.to_string()),
                source: "FACEBOOK".to_string(),
            },
        );
        let worker = QueueWorker::new(pipeline, test_worker_config());

        Self {
            db,
            fetcher,
            notifier,
            sheet,
            worker,
        }
    }

    pub fn queue(&self) -> &LeadQueue {
        self.worker.pipeline().queue()
    }

    pub fn reconciler(&self) -> SyncReconciler {
        SyncReconciler::new(self.worker.pipeline().clone(), Duration::ZERO)
    }
}
