//! External collaborators: lead-data source, messaging gateway, spreadsheet.
//!
//! The pipeline only sees the traits in this module. Concrete clients speak
//! HTTP with `reqwest`; a collaborator without credentials is replaced by
//! [`Disabled`], which fails every call with [`Error::NotConfigured`].

pub mod graph;
pub mod messaging;
pub mod sheets;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::LeadData;

pub use graph::GraphLeadFetcher;
pub use messaging::HttpNotifier;
pub use sheets::SheetsClient;

/// Source of lead contact data.
#[async_trait]
pub trait LeadFetcher: Send + Sync {
    /// Fetch contact data for a lead by its external id.
    async fn fetch(&self, external_id: &str) -> Result<LeadData>;
}

/// Group-messaging gateway.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_to_channel(&self, channel: &str, text: &str) -> Result<()>;
}

/// The spreadsheet leads are recorded in.
#[async_trait]
pub trait RecordKeeper: Send + Sync {
    async fn append_row(&self, row: &SheetRow) -> Result<()>;

    /// Every data row (header excluded).
    async fn list_all_rows(&self) -> Result<Vec<SheetRow>>;
}

/// One spreadsheet row, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRow {
    pub contact: String,
    pub city: String,
    pub product: String,
    pub source: String,
    pub agent: String,
    pub status: String,
    pub project_type: String,
}

impl SheetRow {
    pub fn to_values(&self) -> Vec<String> {
        vec![
            self.contact.clone(),
            self.city.clone(),
            self.product.clone(),
            self.source.clone(),
            self.agent.clone(),
            self.status.clone(),
            self.project_type.clone(),
        ]
    }

    /// Build a row from cell values. Missing trailing cells are empty.
    pub fn from_values(values: &[String]) -> Self {
        let cell = |i: usize| values.get(i).cloned().unwrap_or_default();
        Self {
            contact: cell(0),
            city: cell(1),
            product: cell(2),
            source: cell(3),
            agent: cell(4),
            status: cell(5),
            project_type: cell(6),
        }
    }
}

/// Stand-in for a collaborator whose credentials are missing.
///
/// Logs once when built; every call returns [`Error::NotConfigured`].
#[derive(Debug, Clone, Copy)]
pub struct Disabled {
    what: &'static str,
}

impl Disabled {
    pub fn new(what: &'static str) -> Self {
        warn!(collaborator = what, "credentials missing, collaborator disabled");
        Self { what }
    }
}

#[async_trait]
impl LeadFetcher for Disabled {
    async fn fetch(&self, _external_id: &str) -> Result<LeadData> {
        Err(Error::NotConfigured(self.what))
    }
}

#[async_trait]
impl Notifier for Disabled {
    async fn send_to_channel(&self, _channel: &str, _text: &str) -> Result<()> {
        Err(Error::NotConfigured(self.what))
    }
}

#[async_trait]
impl RecordKeeper for Disabled {
    async fn append_row(&self, _row: &SheetRow) -> Result<()> {
        Err(Error::NotConfigured(self.what))
    }

    async fn list_all_rows(&self) -> Result<Vec<SheetRow>> {
        Err(Error::NotConfigured(self.what))
    }
}

/// The three collaborators the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn LeadFetcher>,
    pub notifier: Arc<dyn Notifier>,
    pub records: Arc<dyn RecordKeeper>,
}

impl Collaborators {
    /// Build real clients where credentials are configured, [`Disabled`] otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let fetcher: Arc<dyn LeadFetcher> =
            Arc::new(GraphLeadFetcher::new(http.clone(), config.graph.clone()));

        let notifier: Arc<dyn Notifier> =
            match (&config.messaging.api_url, &config.messaging.api_key) {
                (Some(url), Some(key)) => {
                    Arc::new(HttpNotifier::new(http.clone(), url.clone(), key.clone()))
                }
                _ => Arc::new(Disabled::new("messaging")),
            };

        let sheets = &config.sheets;
        let records: Arc<dyn RecordKeeper> = match (
            &sheets.spreadsheet_id,
            &sheets.service_account_email,
            &sheets.private_key,
        ) {
            (Some(id), Some(email), Some(key)) => Arc::new(SheetsClient::service_account(
                http,
                id.clone(),
                sheets.sheet_name.clone(),
                email,
                key,
            )?),
            _ => Arc::new(Disabled::new("spreadsheet")),
        };

        Ok(Self {
            fetcher,
            notifier,
            records,
        })
    }
}
