//! Queue worker: interval ticks over actionable leads, plus operator retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::pipeline::LeadPipeline;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::model::{Lead, LeadStatus};

/// Counts from one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Stuck `processing` leads returned to the retry path.
    pub reclaimed: usize,
    pub processed: usize,
    pub completed: usize,
    /// Fetch failed, lead is back to `pending`.
    pub requeued: usize,
    pub failed: usize,
    /// Leads whose attempt ended in a storage error.
    pub errored: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub interval_ms: u64,
}

/// Drives queued leads through the pipeline on a fixed interval.
#[derive(Clone)]
pub struct QueueWorker {
    pipeline: LeadPipeline,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl QueueWorker {
    pub fn new(pipeline: LeadPipeline, config: WorkerConfig) -> Self {
        Self {
            pipeline,
            config,
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pipeline(&self) -> &LeadPipeline {
        &self.pipeline
    }

    /// Signal the run loop to stop after the current tick.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.running.load(Ordering::Relaxed),
            interval_ms: u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Tick immediately, then once per interval, until [`QueueWorker::shutdown`].
    pub async fn run(&self) {
        self.running.store(true, Ordering::Relaxed);
        info!(
            interval_ms = self.status().interval_ms,
            lead_delay_ms = self.config.lead_delay.as_millis() as u64,
            "queue worker started"
        );

        loop {
            if let Err(e) = self.tick().await {
                error!("worker tick error: {e}");
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("queue worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.running.store(false, Ordering::Relaxed);
    }

    /// Reclaim stuck leads, then process every actionable lead in order.
    ///
    /// A failure on one lead is logged and the tick moves on to the next.
    pub async fn tick(&self) -> Result<TickSummary> {
        let _exclusive = self.pipeline.exclusive().await;
        let queue = self.pipeline.queue();

        let mut summary = TickSummary {
            reclaimed: queue.reclaim_stale(self.config.stale_after).await?.len(),
            ..TickSummary::default()
        };

        let leads = queue.list_actionable().await?;
        if leads.is_empty() {
            return Ok(summary);
        }
        info!(count = leads.len(), "processing actionable leads");

        for (i, lead) in leads.iter().enumerate() {
            if i > 0 && !self.config.lead_delay.is_zero() {
                tokio::time::sleep(self.config.lead_delay).await;
            }

            summary.processed += 1;
            match self.pipeline.process(lead).await {
                Ok(stored) => match stored.status {
                    LeadStatus::Completed => summary.completed += 1,
                    LeadStatus::Pending => summary.requeued += 1,
                    LeadStatus::Failed => summary.failed += 1,
                    LeadStatus::Processing => {}
                },
                Err(e) => {
                    summary.errored += 1;
                    error!(external_id = %lead.external_id, "lead processing error: {e}");
                }
            }
        }

        info!(?summary, "tick finished");
        Ok(summary)
    }

    /// Reset every failed lead to `pending`. The next tick picks them up.
    pub async fn retry_failed(&self) -> Result<Vec<Lead>> {
        let _exclusive = self.pipeline.exclusive().await;
        let queue = self.pipeline.queue();

        let failed = queue.list_failed().await?;
        let mut reset = Vec::with_capacity(failed.len());
        for lead in failed {
            match queue.reset_for_retry(&lead.external_id).await {
                Ok(lead) => reset.push(lead),
                Err(e) => warn!(external_id = %lead.external_id, "reset failed: {e}"),
            }
        }
        info!(count = reset.len(), "failed leads reset for retry");
        Ok(reset)
    }

    /// Reset one lead and run the pipeline on it right away.
    pub async fn retry_one(&self, external_id: &str) -> Result<Lead> {
        let _exclusive = self.pipeline.exclusive().await;
        let queue = self.pipeline.queue();

        queue.require(external_id).await?;
        let lead = queue.reset_for_retry(external_id).await?;
        info!(external_id, "manual retry");
        self.pipeline.process(&lead).await
    }
}
