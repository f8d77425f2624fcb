//! Sync reconciler: makes sure every local lead reached the spreadsheet.
//!
//! Matching is by normalized contact name only, so two people with the same
//! name count as one.

use std::collections::HashSet;
use std::time::Duration;

use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::{info, warn};

use super::message::normalize_contact;
use super::pipeline::LeadPipeline;
use crate::error::Result;
use crate::model::{LeadResults, LeadStatus};
use crate::telemetry::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced,
    AlreadyInSheets,
    Failed,
}

impl SyncOutcome {
    fn as_str(self) -> &'static str {
        match self {
            SyncOutcome::Synced => "synced",
            SyncOutcome::AlreadyInSheets => "already_in_sheets",
            SyncOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncDetail {
    pub external_id: String,
    pub contact: Option<String>,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<LeadResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub already_in_sheets: usize,
    pub failed: usize,
    pub details: Vec<SyncDetail>,
}

impl SyncReport {
    fn push(&mut self, detail: SyncDetail) {
        match detail.outcome {
            SyncOutcome::Synced => self.synced += 1,
            SyncOutcome::AlreadyInSheets => self.already_in_sheets += 1,
            SyncOutcome::Failed => self.failed += 1,
        }
        metrics::reconcile_outcomes().add(1, &[KeyValue::new("outcome", detail.outcome.as_str())]);
        self.details.push(detail);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub local_leads: usize,
    pub sheet_rows: usize,
    /// Leads not completed, or completed without a spreadsheet row.
    pub pending_sync: usize,
}

pub struct SyncReconciler {
    pipeline: LeadPipeline,
    lead_delay: Duration,
}

impl SyncReconciler {
    pub fn new(pipeline: LeadPipeline, lead_delay: Duration) -> Self {
        Self {
            pipeline,
            lead_delay,
        }
    }

    /// Reconcile every local lead against the spreadsheet.
    ///
    /// Fails only when the leads or the spreadsheet rows cannot be loaded.
    pub async fn run(&self) -> Result<SyncReport> {
        let _exclusive = self.pipeline.exclusive().await;
        let queue = self.pipeline.queue();

        let leads = queue.list_all().await?;
        let mut report = SyncReport::default();
        if leads.is_empty() {
            info!("no local leads to sync");
            return Ok(report);
        }

        let rows = self.pipeline.collaborators().records.list_all_rows().await?;
        let in_sheets: HashSet<String> = rows
            .iter()
            .map(|row| normalize_contact(&row.contact))
            .collect();
        info!(local = leads.len(), rows = rows.len(), "sync started");

        for (i, lead) in leads.iter().enumerate() {
            if i > 0 && !self.lead_delay.is_zero() {
                tokio::time::sleep(self.lead_delay).await;
            }

            let external_id = lead.external_id.clone();
            let data = match &lead.fetched_data {
                Some(data) => data.clone(),
                None => match self.pipeline.fetch_and_cache(&external_id).await {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(%external_id, "sync could not fetch lead data: {e}");
                        report.push(SyncDetail {
                            external_id,
                            contact: None,
                            outcome: SyncOutcome::Failed,
                            agent: None,
                            flags: None,
                            reason: Some(e.to_string()),
                        });
                        continue;
                    }
                },
            };

            if in_sheets.contains(&normalize_contact(&data.name)) {
                report.push(SyncDetail {
                    external_id,
                    contact: Some(data.name),
                    outcome: SyncOutcome::AlreadyInSheets,
                    agent: None,
                    flags: None,
                    reason: None,
                });
                continue;
            }

            let synced = match self.pipeline.deliver(&data).await {
                Ok(delivery) => queue
                    .record_outcome(&external_id, LeadStatus::Completed, delivery.flags, None)
                    .await
                    .map(|stored| (delivery.assignment.agent, stored.results)),
                Err(e) => Err(e),
            };

            match synced {
                Ok((agent, flags)) => {
                    info!(%external_id, %agent, "lead synced");
                    report.push(SyncDetail {
                        external_id,
                        contact: Some(data.name),
                        outcome: SyncOutcome::Synced,
                        agent: Some(agent),
                        flags: Some(flags),
                        reason: None,
                    });
                }
                Err(e) => {
                    warn!(%external_id, "sync failed: {e}");
                    report.push(SyncDetail {
                        external_id,
                        contact: Some(data.name),
                        outcome: SyncOutcome::Failed,
                        agent: None,
                        flags: None,
                        reason: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            synced = report.synced,
            already_in_sheets = report.already_in_sheets,
            failed = report.failed,
            "sync finished"
        );
        Ok(report)
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        let leads = self.pipeline.queue().list_all().await?;
        let rows = self.pipeline.collaborators().records.list_all_rows().await?;

        let pending_sync = leads
            .iter()
            .filter(|l| l.status != LeadStatus::Completed || !l.results.recorded)
            .count();

        Ok(SyncStatus {
            local_leads: leads.len(),
            sheet_rows: rows.len(),
            pending_sync,
        })
    }
}
