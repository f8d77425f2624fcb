//! # leadflow
//!
//! Lead distribution service backed by SQLite.
//!
//! Provides a durable lead queue with idempotent enqueue and bounded retry, a
//! round-robin assignment ledger over two agents, an interval worker that
//! fetches, assigns, notifies and records each lead, a reconciler against the
//! tracking spreadsheet, and an axum HTTP surface with OpenTelemetry
//! observability.

pub mod clients;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod http;
pub mod model;
pub mod telemetry;
