//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast if required vars are missing or
//! malformed. Collaborator credentials are optional: a missing one disables
//! that collaborator instead of stopping the process.
//! Sensitive values are wrapped in `SecretString` to keep them out of logs.

pub mod secrets;

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{Agent, AgentRoster};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    /// SQLite URL, e.g. `sqlite://data/leadflow.db`.
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Token the lead-gen platform must echo during the webhook handshake.
    pub verify_token: SecretString,
    /// When set, operator actions require a matching `x-api-key` header.
    pub operator_api_key: Option<SecretString>,
    pub graph: GraphConfig,
    pub messaging: MessagingConfig,
    pub sheets: SheetsConfig,
    pub roster: AgentRoster,
    pub worker: WorkerConfig,
    /// Pause between leads during a sync run.
    pub sync_lead_delay: Duration,
    /// Source label written into messages and spreadsheet rows.
    pub lead_source: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Lead-gen platform API (Graph API) settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub access_token: Option<SecretString>,
    pub api_version: String,
    pub base_url: String,
}

/// Messaging gateway settings.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub api_url: Option<String>,
    pub api_key: Option<SecretString>,
    /// Shared channel that receives the broadcast message for every lead.
    pub primary_channel: Option<String>,
}

/// Spreadsheet settings.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub service_account_email: Option<String>,
    /// PEM signing key of the service account.
    pub private_key: Option<SecretString>,
}

/// Queue worker pacing and retry policy.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Pause between two leads within a tick.
    pub lead_delay: Duration,
    pub max_retries: u32,
    /// A lead in `processing` longer than this is reclaimed at the next tick.
    pub stale_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let interval = Duration::from_secs(10);
        Self {
            interval,
            lead_delay: Duration::from_secs(3),
            max_retries: 3,
            stale_after: interval * 6,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = WorkerConfig::default();
        let interval = Duration::from_secs(parsed_var(
            "WORKER_INTERVAL_SECS",
            defaults.interval.as_secs(),
        )?);
        let stale_after = match optional_var("STALE_PROCESSING_SECS") {
            Some(raw) => Duration::from_secs(parse_value("STALE_PROCESSING_SECS", &raw)?),
            None => interval * 6,
        };

        Ok(Self {
            database_url: required_var("DATABASE_URL")?,
            bind_addr: parsed_var("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            verify_token: SecretString::from(required_var("WEBHOOK_VERIFY_TOKEN")?),
            operator_api_key: secret_var("OPERATOR_API_KEY"),
            graph: GraphConfig {
                access_token: secret_var("GRAPH_ACCESS_TOKEN"),
                api_version: var_or("GRAPH_API_VERSION", "v18.0"),
                base_url: var_or("GRAPH_BASE_URL", "https://graph.facebook.com"),
            },
            messaging: MessagingConfig {
                api_url: optional_var("MESSAGING_API_URL"),
                api_key: secret_var("MESSAGING_API_KEY"),
                primary_channel: optional_var("PRIMARY_CHANNEL_ID"),
            },
            sheets: SheetsConfig {
                spreadsheet_id: optional_var("SHEETS_SPREADSHEET_ID"),
                sheet_name: var_or("SHEETS_SHEET_NAME", "DATOS"),
                service_account_email: optional_var("GOOGLE_SERVICE_ACCOUNT_EMAIL"),
                private_key: pem_var("GOOGLE_PRIVATE_KEY"),
            },
            roster: AgentRoster::new(
                Agent::new(var_or("AGENT_A_CODE", "VRJ"), optional_var("AGENT_A_CHANNEL")),
                Agent::new(var_or("AGENT_B_CODE", "DLAB"), optional_var("AGENT_B_CHANNEL")),
            ),
            worker: WorkerConfig {
                interval,
                lead_delay: Duration::from_secs(parsed_var(
                    "WORKER_LEAD_DELAY_SECS",
                    defaults.lead_delay.as_secs(),
                )?),
                max_retries: parsed_var("MAX_RETRIES", defaults.max_retries)?,
                stale_after,
            },
            sync_lead_delay: Duration::from_secs(parsed_var("SYNC_LEAD_DELAY_SECS", 2)?),
            lead_source: var_or("LEAD_SOURCE", "FACEBOOK"),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: var_or("LOG_LEVEL", "info"),
        })
        .and_then(Config::validated)
    }

    fn validated(self) -> Result<Self> {
        if self.roster.first().code == self.roster.second().code {
            return Err(Error::Config(format!(
                "AGENT_A_CODE and AGENT_B_CODE must differ (both are {})",
                self.roster.first().code
            )));
        }
        if self.worker.interval.is_zero() {
            return Err(Error::Config(
                "WORKER_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if self.worker.max_retries == 0 {
            return Err(Error::Config("MAX_RETRIES must be at least 1".to_string()));
        }
        Ok(self)
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// A set, non-blank variable.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn secret_var(name: &str) -> Option<SecretString> {
    optional_var(name).map(SecretString::from)
}

/// PEM keys pasted into a single-line env var carry literal `\n` escapes.
fn pem_var(name: &str) -> Option<SecretString> {
    optional_var(name).map(|raw| SecretString::from(raw.replace("\\n", "\n")))
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}")))
}
