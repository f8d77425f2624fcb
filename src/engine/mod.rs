//! Lead engine: the per-lead pipeline, the interval worker and the sync reconciler.

pub mod message;
pub mod pipeline;
pub mod reconcile;
pub mod worker;

pub use message::{LeadCard, normalize_contact};
pub use pipeline::{Delivery, LeadPipeline, PipelineSettings};
pub use reconcile::{SyncDetail, SyncOutcome, SyncReconciler, SyncReport, SyncStatus};
pub use worker::{QueueWorker, TickSummary, WorkerStatus};
