//! Error types for leadflow.

use thiserror::Error;

use crate::model::LeadStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("lead not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: LeadStatus, to: LeadStatus },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("lead fetch failed: {0}")]
    Fetch(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("spreadsheet error: {0}")]
    Record(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors that indicate a caller bug rather than a runtime condition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidTransition { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
