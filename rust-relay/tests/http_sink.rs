//! HTTP sink against a throwaway local gateway.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use smsrelay::{DeliverySink, HttpSink, RelayError};

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

async fn record(State(received): State<Received>, Json(body): Json<serde_json::Value>) -> StatusCode {
    received.lock().unwrap().push(body);
    StatusCode::OK
}

async fn refuse() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn gateway() -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/down", get(refuse))
        .route("/send", post(record))
        .route("/reject", post(refuse))
        .with_state(Arc::clone(&received));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), received)
}

#[tokio::test]
async fn test_check_and_deliver() {
    let (base, received) = gateway().await;
    let sink = HttpSink::new(
        format!("{}/send", base),
        Some(format!("{}/health", base)),
        Duration::from_secs(2),
    )
    .unwrap();

    sink.check().await.unwrap();
    sink.deliver("Server down now", "5551234").await.unwrap();

    let received = received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["destination"], "5551234");
    assert_eq!(received[0]["body"], "Server down now");
}

#[tokio::test]
async fn test_unhealthy_gateway_is_unreachable() {
    let (base, _) = gateway().await;
    let sink = HttpSink::new(
        format!("{}/send", base),
        Some(format!("{}/down", base)),
        Duration::from_secs(2),
    )
    .unwrap();

    assert!(matches!(sink.check().await, Err(RelayError::SinkUnreachable(_))));
}

#[tokio::test]
async fn test_rejected_delivery_is_an_error() {
    let (base, _) = gateway().await;
    let sink = HttpSink::new(format!("{}/reject", base), None, Duration::from_secs(2)).unwrap();

    assert!(matches!(
        sink.deliver("Hello", "5551234").await,
        Err(RelayError::SinkDelivery(_))
    ));
}
