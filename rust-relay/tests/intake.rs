//! Intake route tests using `tower::ServiceExt` without a real HTTP server,
//! plus the full intake → queue → worker relay.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use common::{never, worker_settings, RecordingSink, QUEUE};
use smsrelay::queue::{decode, TOKEN_ALPHABET};
use smsrelay::web::{router, Enqueuer, EnqueuerTasks, SaturationPolicy};
use smsrelay::{AppState, Config, DeliveryWorker, MemoryQueue, SinkFailurePolicy};

fn intake(backend: &MemoryQueue) -> (Router, EnqueuerTasks) {
    let mut config = Config::from_env();
    config.handler_uri = "/sms".to_string();
    config.token_length = 12;

    let (enqueuer, tasks) = Enqueuer::spawn(
        backend.clone(),
        QUEUE.to_string(),
        2,
        16,
        SaturationPolicy::Wait,
    );
    (router(AppState::new(config, enqueuer)), tasks)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let backend = MemoryQueue::new();
    let (app, _tasks) = intake(&backend);

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_accepts_and_enqueues_tagged_record() {
    let backend = MemoryQueue::new();
    let (app, tasks) = intake(&backend);

    let (status, body) = get(&app, "/sms?tel=5551234&msg=Hello").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());

    drop(app);
    tasks.drain().await;

    let records = backend.contents(QUEUE).await;
    assert_eq!(records.len(), 1);

    let envelope = decode(&records[0]).unwrap().unwrap();
    assert_eq!(envelope.token.len(), 12);
    assert!(envelope.token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    assert_eq!(envelope.destination, "5551234");
    assert_eq!(envelope.body, "Hello");
    assert_eq!(records[0], format!("{} 5551234 Hello", envelope.token));
}

#[tokio::test]
async fn test_post_is_accepted_too() {
    let backend = MemoryQueue::new();
    let (app, tasks) = intake(&backend);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sms?tel=5551234&msg=Hello")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    drop(app);
    tasks.drain().await;
    assert_eq!(backend.len(QUEUE).await, 1);
}

#[tokio::test]
async fn test_missing_parameters_never_enqueue() {
    let backend = MemoryQueue::new();
    let (app, tasks) = intake(&backend);

    for uri in ["/sms?tel=5551234", "/sms?msg=Hello", "/sms"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body.is_empty());
    }

    drop(app);
    tasks.drain().await;
    assert_eq!(backend.len(QUEUE).await, 0);
}

#[tokio::test]
async fn test_repeated_parameters_use_first_value() {
    let backend = MemoryQueue::new();
    let (app, tasks) = intake(&backend);

    let (status, body) = get(&app, "/sms?tel=5551234&tel=5550000&msg=Hello&msg=Later").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());

    drop(app);
    tasks.drain().await;

    let records = backend.contents(QUEUE).await;
    assert_eq!(records.len(), 1);
    let envelope = decode(&records[0]).unwrap().unwrap();
    assert_eq!(envelope.destination, "5551234");
    assert_eq!(envelope.body, "Hello");
}

#[tokio::test]
async fn test_destination_with_separator_rejected() {
    let backend = MemoryQueue::new();
    let (app, tasks) = intake(&backend);

    let (status, _) = get(&app, "/sms?tel=555%201234&msg=Hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    drop(app);
    tasks.drain().await;
    assert_eq!(backend.len(QUEUE).await, 0);
}

#[tokio::test]
async fn test_relay_end_to_end() {
    let backend = MemoryQueue::new();
    let (app, tasks) = intake(&backend);

    let (status, _) = get(&app, "/sms?tel=5551234&msg=Server%20down%20now").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = get(&app, "/sms?tel=5559876&msg=Hello").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    drop(app);
    tasks.drain().await;

    let sink = RecordingSink::reachable_for(2);
    DeliveryWorker::new(backend.clone(), sink.clone(), worker_settings(SinkFailurePolicy::Drop))
        .run(never())
        .await;

    let mut delivered = sink.deliveries();
    delivered.sort();
    assert_eq!(
        delivered,
        vec![
            ("Hello".to_string(), "5559876".to_string()),
            ("Server down now".to_string(), "5551234".to_string()),
        ]
    );
    assert_eq!(backend.len(QUEUE).await, 0);
}
