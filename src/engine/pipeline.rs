//! Per-lead pipeline: fetch, assign, notify, record.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{Instrument, Span, info, warn};

use super::message::LeadCard;
use crate::clients::Collaborators;
use crate::db::{AssignmentLedger, LeadQueue};
use crate::error::Result;
use crate::model::{Assignment, Lead, LeadData, LeadResults, LeadStatus};
use crate::telemetry::lead::{record_agent, record_status, start_lead_span};
use crate::telemetry::metrics;

/// Where and how leads are announced.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Shared channel for the broadcast message. `None` skips the broadcast.
    pub primary_channel: Option<String>,
    /// Source label on cards and rows.
    pub source: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            primary_channel: None,
            source: "FACEBOOK".to_string(),
        }
    }
}

/// What one delivery (assign, notify, record) achieved.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub assignment: Assignment,
    pub flags: LeadResults,
}

/// The stores and collaborators a lead passes through.
///
/// Clones share the stores and the exclusive lock.
#[derive(Clone)]
pub struct LeadPipeline {
    queue: LeadQueue,
    ledger: AssignmentLedger,
    collaborators: Collaborators,
    settings: PipelineSettings,
    exclusive: Arc<Mutex<()>>,
}

impl LeadPipeline {
    pub fn new(
        queue: LeadQueue,
        ledger: AssignmentLedger,
        collaborators: Collaborators,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            queue,
            ledger,
            collaborators,
            settings,
            exclusive: Arc::new(Mutex::new(())),
        }
    }

    pub fn queue(&self) -> &LeadQueue {
        &self.queue
    }

    pub fn ledger(&self) -> &AssignmentLedger {
        &self.ledger
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Lock held for a worker tick, an operator retry or a sync run.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.exclusive.lock().await
    }

    /// Run one processing attempt for `lead` and return the stored result.
    ///
    /// Errors are storage or contract errors only. Collaborator failures end
    /// up in the lead's status and flags.
    pub async fn process(&self, lead: &Lead) -> Result<Lead> {
        let started = Instant::now();
        let lead = self.queue.mark_attempt_started(&lead.external_id).await?;
        let span = start_lead_span(&lead.external_id, lead.attempts);

        let result = async {
            let data = match self.lead_data(&lead).await {
                Ok(data) => data,
                Err(e) => {
                    let next = if lead.attempts < self.queue.max_retries() {
                        LeadStatus::Pending
                    } else {
                        LeadStatus::Failed
                    };
                    warn!(
                        attempts = lead.attempts,
                        max_retries = self.queue.max_retries(),
                        next = %next,
                        "fetch failed: {e}"
                    );
                    record_status(&span, LeadStatus::Processing.as_str(), next.as_str());
                    return self
                        .queue
                        .record_outcome(
                            &lead.external_id,
                            next,
                            LeadResults::default(),
                            Some(&e.to_string()),
                        )
                        .await;
                }
            };

            let delivery = self.deliver(&data).await?;
            record_status(
                &span,
                LeadStatus::Processing.as_str(),
                LeadStatus::Completed.as_str(),
            );
            info!(agent = %delivery.assignment.agent, flags = ?delivery.flags, "lead completed");
            self.queue
                .record_outcome(
                    &lead.external_id,
                    LeadStatus::Completed,
                    delivery.flags,
                    None,
                )
                .await
        }
        .instrument(span.clone())
        .await;

        if let Ok(stored) = &result {
            metrics::pipeline_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("status", stored.status.as_str())],
            );
        }
        result
    }

    /// Cached contact data, or a fresh fetch that is then cached.
    async fn lead_data(&self, lead: &Lead) -> Result<LeadData> {
        match &lead.fetched_data {
            Some(data) => Ok(data.clone()),
            None => self.fetch_and_cache(&lead.external_id).await,
        }
    }

    /// Fetch contact data from the source and cache it on the lead.
    pub async fn fetch_and_cache(&self, external_id: &str) -> Result<LeadData> {
        let data = self.collaborators.fetcher.fetch(external_id).await?;
        self.queue.store_fetched_data(external_id, &data).await?;
        Ok(data)
    }

    /// Assign an agent, send both messages and append the spreadsheet row.
    ///
    /// Only the assignment can fail this call. Each send and the append are
    /// independent and are reflected in the returned flags.
    pub async fn deliver(&self, data: &LeadData) -> Result<Delivery> {
        let assignment = self.ledger.assign_next().await?;
        record_agent(&Span::current(), &assignment.agent);

        let card = LeadCard::new(data, &self.settings.source, &assignment.agent);

        let notified_primary = match &self.settings.primary_channel {
            Some(channel) => self.send("primary", channel, &card.broadcast()).await,
            None => {
                warn!("no primary channel configured, broadcast skipped");
                false
            }
        };
        let notified_agent = match &assignment.destination {
            Some(channel) => self.send("agent", channel, &card.directive()).await,
            None => {
                warn!(agent = %assignment.agent, "agent has no channel, directive skipped");
                false
            }
        };

        let recorded = match self.collaborators.records.append_row(&card.sheet_row()).await {
            Ok(()) => {
                count_delivery("sheet", true);
                true
            }
            Err(e) => {
                count_delivery("sheet", false);
                warn!(contact = %card.contact, "spreadsheet append failed: {e}");
                false
            }
        };

        Ok(Delivery {
            assignment,
            flags: LeadResults {
                data_fetched: true,
                notified_primary,
                notified_agent,
                recorded,
            },
        })
    }

    async fn send(&self, target: &'static str, channel: &str, text: &str) -> bool {
        match self.collaborators.notifier.send_to_channel(channel, text).await {
            Ok(()) => {
                count_delivery(target, true);
                true
            }
            Err(e) => {
                count_delivery(target, false);
                warn!(target, channel, "notification failed: {e}");
                false
            }
        }
    }
}

fn count_delivery(target: &'static str, ok: bool) {
    metrics::deliveries().add(
        1,
        &[
            KeyValue::new("target", target),
            KeyValue::new("result", if ok { "ok" } else { "error" }),
        ],
    );
}
