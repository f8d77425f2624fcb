//! Integration tests for the HTTP surface.

mod common;

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use leadflow::http::{AppState, router};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::Harness;

const VERIFY_TOKEN: &str = "verify-secret";
const OPERATOR_KEY: &str = "operator-key";

fn test_app(h: &Harness, operator_key: Option<&str>) -> Router {
    router(AppState::new(
        h.worker.clone(),
        h.reconciler(),
        SecretString::from(VERIFY_TOKEN.to_string()),
        operator_key.map(|k| SecretString::from(k.to_string())),
    ))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn webhook_verification_echoes_challenge() {
    let h = Harness::new().await;

    let (status, body) = send(
        test_app(&h, None),
        get("/webhook?hub.mode=subscribe&hub.verify_token=verify-secret&hub.challenge=12345"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"12345");

    let (status, _) = send(
        test_app(&h, None),
        get("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=12345"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_post_enqueues_leadgen_changes() {
    let h = Harness::new().await;
    let payload = json!({
        "object": "page",
        "entry": [{ "changes": [{ "field": "leadgen", "value": { "leadgen_id": "LG-1" } }] }]
    });

    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _) = send(test_app(&h, None), request).await;
    assert_eq!(status, StatusCode::OK);

    let lead = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(lead) = h.queue().get_by_external_id("LG-1").await.unwrap() {
                return lead;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(lead.raw_payload, Some(payload));
}

#[tokio::test]
async fn webhook_post_always_acknowledges() {
    let h = Harness::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _) = send(test_app(&h, None), request).await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Queue endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_endpoint_is_idempotent() {
    let h = Harness::new().await;

    let (status, body) = send_json(test_app(&h, None), post("/queue/add/L-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["created"], true);
    assert_eq!(body["data"]["lead"]["status"], "pending");

    let (_, body) = send_json(test_app(&h, None), post("/queue/add/L-1")).await;
    assert_eq!(body["data"]["created"], false);

    let (_, body) = send_json(test_app(&h, None), get("/queue/pending")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn retry_unknown_lead_is_404() {
    let h = Harness::new().await;
    let (status, body) = send_json(test_app(&h, None), post("/queue/retry/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn retry_endpoint_returns_final_record() {
    let h = Harness::new().await;
    h.queue().enqueue("L-1", None).await.unwrap();

    let (status, body) = send_json(test_app(&h, None), post("/queue/retry/L-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["results"]["recorded"], true);
}

#[tokio::test]
async fn queue_overview_and_failed_list() {
    let h = Harness::new().await;
    h.fetcher.fail("BAD");
    h.queue().enqueue("BAD", None).await.unwrap();
    for _ in 0..3 {
        h.worker.tick().await.unwrap();
    }

    let (_, body) = send_json(test_app(&h, None), get("/queue")).await;
    assert_eq!(body["data"]["stats"]["failed"], 1);
    assert_eq!(body["data"]["recent"][0]["external_id"], "BAD");

    let (_, body) = send_json(test_app(&h, None), get("/queue/failed")).await;
    assert_eq!(body["data"][0]["attempts"], 3);

    let (_, body) = send_json(test_app(&h, None), post("/queue/retry-all")).await;
    assert_eq!(body["data"]["reset"], 1);
}

// ---------------------------------------------------------------------------
// Stats, health, sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_reports_queue_ledger_and_worker() {
    let h = Harness::new().await;
    h.queue().enqueue("L-1", None).await.unwrap();
    h.worker.tick().await.unwrap();

    let (status, body) = send_json(test_app(&h, None), get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["queue"]["completed"], 1);
    assert_eq!(body["data"]["assignments"]["total"], 1);
    assert_eq!(body["data"]["assignments"]["counters"]["A"], 1);
    assert_eq!(body["data"]["worker"]["running"], false);
    assert_eq!(body["data"]["worker"]["interval_ms"], 20);
}

#[tokio::test]
async fn health_is_ok() {
    let h = Harness::new().await;
    let (status, body) = send_json(test_app(&h, None), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn sync_endpoints_report_progress() {
    let h = Harness::new().await;
    h.queue().enqueue("L-1", None).await.unwrap();

    let (_, body) = send_json(test_app(&h, None), get("/sync/status")).await;
    assert_eq!(body["data"]["pending_sync"], 1);

    let (status, body) = send_json(test_app(&h, None), post("/sync")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["synced"], 1);
    assert_eq!(body["data"]["details"][0]["outcome"], "synced");

    let (_, body) = send_json(test_app(&h, None), get("/sync/status")).await;
    assert_eq!(body["data"]["pending_sync"], 0);
}

// ---------------------------------------------------------------------------
// Operator key
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operator_routes_require_key_when_configured() {
    let h = Harness::new().await;

    let (status, body) =
        send_json(test_app(&h, Some(OPERATOR_KEY)), post("/queue/retry-all")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "missing or invalid x-api-key");

    let wrong = Request::builder()
        .method("POST")
        .uri("/queue/add/L-1")
        .header("x-api-key", "nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(test_app(&h, Some(OPERATOR_KEY)), wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .method("POST")
        .uri("/queue/add/L-1")
        .header("x-api-key", OPERATOR_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(test_app(&h, Some(OPERATOR_KEY)), authorized).await;
    assert_eq!(status, StatusCode::OK);

    // Read-only routes stay open.
    let (status, _) = send(test_app(&h, Some(OPERATOR_KEY)), get("/queue")).await;
    assert_eq!(status, StatusCode::OK);
}
