//! Integration tests for the lead queue store.

use std::time::Duration;

use leadflow::db::Db;
use leadflow::db::leads::ABANDONED_ATTEMPT;
use leadflow::error::Error;
use leadflow::model::*;
use serde_json::json;

async fn test_queue() -> (Db, leadflow::db::LeadQueue) {
    let db = Db::in_memory().await.unwrap();
    let queue = db.lead_queue(3);
    (db, queue)
}

fn data(name: &str) -> LeadData {
    LeadData {
        name: name.to_string(),
        phone: "4621234567".to_string(),
        city: "León".to_string(),
        product: "Velaria".to_string(),
    }
}

/// Drive a lead through one attempt that ends in `status`.
async fn attempt(queue: &leadflow::db::LeadQueue, id: &str, status: LeadStatus) -> Lead {
    queue.mark_attempt_started(id).await.unwrap();
    queue
        .record_outcome(id, status, LeadResults::default(), Some("fetch failed"))
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_is_idempotent() {
    let (_db, queue) = test_queue().await;

    let first = queue
        .enqueue("L-1", Some(json!({"entry": [1]})))
        .await
        .unwrap();
    assert!(first.is_created());
    let first = first.into_lead();
    assert_eq!(first.status, LeadStatus::Pending);
    assert_eq!(first.attempts, 0);

    let second = queue
        .enqueue("L-1", Some(json!({"entry": [2]})))
        .await
        .unwrap();
    assert!(!second.is_created());
    let second = second.into_lead();
    assert_eq!(second.id, first.id);
    assert_eq!(second.raw_payload, Some(json!({"entry": [1]})));

    assert_eq!(queue.stats().await.unwrap().total, 1);
}

#[tokio::test]
async fn enqueue_does_not_disturb_a_processed_lead() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();
    attempt(&queue, "L-1", LeadStatus::Failed).await;

    let again = queue.enqueue("L-1", None).await.unwrap().into_lead();
    assert_eq!(again.status, LeadStatus::Failed);
    assert_eq!(again.attempts, 1);
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn actionable_lists_pending_before_retryable_failed() {
    let (_db, queue) = test_queue().await;

    queue.enqueue("F-1", None).await.unwrap();
    queue.enqueue("X-1", None).await.unwrap();
    queue.enqueue("P-1", None).await.unwrap();
    queue.enqueue("P-2", None).await.unwrap();

    // F-1: failed once, still under the ceiling.
    attempt(&queue, "F-1", LeadStatus::Failed).await;

    // X-1: exhausted.
    attempt(&queue, "X-1", LeadStatus::Pending).await;
    attempt(&queue, "X-1", LeadStatus::Pending).await;
    let exhausted = attempt(&queue, "X-1", LeadStatus::Failed).await;
    assert_eq!(exhausted.attempts, 3);

    let ids: Vec<String> = queue
        .list_actionable()
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.external_id)
        .collect();
    assert_eq!(ids, vec!["P-1", "P-2", "F-1"]);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.retryable, 1);
    assert_eq!(stats.total, 4);
}

#[tokio::test]
async fn recent_lists_newest_first() {
    let (_db, queue) = test_queue().await;
    for id in ["L-1", "L-2", "L-3"] {
        queue.enqueue(id, None).await.unwrap();
    }

    let recent: Vec<String> = queue
        .list_recent(2)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.external_id)
        .collect();
    assert_eq!(recent, vec!["L-3", "L-2"]);

    assert_eq!(queue.list_all().await.unwrap().len(), 3);
    assert_eq!(
        queue
            .list_by_status(LeadStatus::Pending, Some(1))
            .await
            .unwrap()
            .len(),
        1
    );
}

// ---------------------------------------------------------------------------
// Attempts and outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attempt_start_counts_and_stamps() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();

    let lead = queue.mark_attempt_started("L-1").await.unwrap();
    assert_eq!(lead.status, LeadStatus::Processing);
    assert_eq!(lead.attempts, 1);
    assert!(lead.last_attempt_at.is_some());
    assert!(lead.processed_at.is_none());
}

#[tokio::test]
async fn outcome_flags_are_or_merged() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();
    queue.mark_attempt_started("L-1").await.unwrap();

    queue
        .record_outcome(
            "L-1",
            LeadStatus::Completed,
            LeadResults {
                data_fetched: true,
                notified_primary: true,
                ..LeadResults::default()
            },
            None,
        )
        .await
        .unwrap();

    let lead = queue
        .record_outcome(
            "L-1",
            LeadStatus::Completed,
            LeadResults {
                recorded: true,
                ..LeadResults::default()
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(lead.status, LeadStatus::Completed);
    assert!(lead.processed_at.is_some());
    assert_eq!(
        lead.results,
        LeadResults {
            data_fetched: true,
            notified_primary: true,
            notified_agent: false,
            recorded: true,
        }
    );
}

#[tokio::test]
async fn completion_clears_an_earlier_fetch_error() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();

    let lead = attempt(&queue, "L-1", LeadStatus::Pending).await;
    assert_eq!(lead.last_error.as_deref(), Some("fetch failed"));

    queue.mark_attempt_started("L-1").await.unwrap();
    let lead = queue
        .record_outcome("L-1", LeadStatus::Completed, LeadResults::default(), None)
        .await
        .unwrap();
    assert_eq!(lead.status, LeadStatus::Completed);
    assert!(lead.last_error.is_none());
}

#[tokio::test]
async fn outcome_for_unknown_lead_is_not_found() {
    let (_db, queue) = test_queue().await;

    let err = queue
        .record_outcome("ghost", LeadStatus::Completed, LeadResults::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref id) if id == "ghost"));
    assert!(err.is_contract_violation());
}

#[tokio::test]
async fn completed_lead_cannot_start_another_attempt() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();
    attempt(&queue, "L-1", LeadStatus::Completed).await;

    let err = queue.mark_attempt_started("L-1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: LeadStatus::Completed,
            to: LeadStatus::Processing
        }
    ));
}

#[tokio::test]
async fn reset_clears_progress_but_keeps_data() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();
    queue.store_fetched_data("L-1", &data("Ana Ruiz")).await.unwrap();
    queue.mark_attempt_started("L-1").await.unwrap();
    queue
        .record_outcome(
            "L-1",
            LeadStatus::Failed,
            LeadResults {
                data_fetched: true,
                recorded: true,
                ..LeadResults::default()
            },
            Some("boom"),
        )
        .await
        .unwrap();

    let lead = queue.reset_for_retry("L-1").await.unwrap();
    assert_eq!(lead.status, LeadStatus::Pending);
    assert_eq!(lead.attempts, 0);
    assert!(lead.last_error.is_none());
    assert_eq!(lead.results, LeadResults::default());
    assert_eq!(lead.contact_name(), Some("Ana Ruiz"));
}

#[tokio::test]
async fn first_fetched_data_is_kept() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();

    queue.store_fetched_data("L-1", &data("First")).await.unwrap();
    let lead = queue.store_fetched_data("L-1", &data("Second")).await.unwrap();
    assert_eq!(lead.contact_name(), Some("First"));

    let err = queue.store_fetched_data("ghost", &data("x")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Stale reclaim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_processing_lead_returns_to_pending() {
    let (_db, queue) = test_queue().await;
    queue.enqueue("L-1", None).await.unwrap();
    queue.mark_attempt_started("L-1").await.unwrap();

    assert!(
        queue
            .reclaim_stale(Duration::from_secs(3600))
            .await
            .unwrap()
            .is_empty()
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    let reclaimed = queue.reclaim_stale(Duration::ZERO).await.unwrap();
    assert_eq!(reclaimed.len(), 1);

    let lead = &reclaimed[0];
    assert_eq!(lead.status, LeadStatus::Pending);
    assert_eq!(lead.attempts, 1);
    assert_eq!(lead.last_error.as_deref(), Some(ABANDONED_ATTEMPT));
}

#[tokio::test]
async fn stale_lead_at_the_ceiling_fails() {
    let db = Db::in_memory().await.unwrap();
    let queue = db.lead_queue(1);
    queue.enqueue("L-1", None).await.unwrap();
    queue.mark_attempt_started("L-1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let reclaimed = queue.reclaim_stale(Duration::ZERO).await.unwrap();
    assert_eq!(reclaimed[0].status, LeadStatus::Failed);
    assert!(queue.list_actionable().await.unwrap().is_empty());
}
