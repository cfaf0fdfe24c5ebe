//! SMSRelay Intake - thin notification receiver.
//!
//! This binary provides a fast web server that:
//! - Accepts `tel` and `msg` query parameters on the configured route
//! - Tags each request with a trace token
//! - Hands the envelope to background tasks that push it onto Redis
//! - Returns before the push completes
//!
//! Delivery happens in the separate worker process.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use smsrelay::web::{router, Enqueuer};
use smsrelay::telemetry::{self, LoggingConfig};
use smsrelay::util::shutdown_signal;
use smsrelay::{AppState, Config, ConnectionPool, QueueBackend, RedisQueue};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging first so config warnings are kept
    telemetry::init(&LoggingConfig::from_env());

    // Load configuration from environment
    let config = Config::from_env();

    info!("intake_starting");
    info!(
        listen_addr = %config.listen_addr,
        port = config.port,
        handler_uri = %config.handler_uri,
        queue = %config.redis_queue,
        enqueue_workers = config.enqueue_workers,
        enqueue_saturation = ?config.enqueue_saturation,
        "config_loaded"
    );

    // Create the Redis pool; connections are dialed on first use
    let pool = ConnectionPool::connect(&config.pool()).context("Failed to create Redis pool")?;
    let backend = RedisQueue::new(pool, config.op_timeout());

    if let Err(e) = backend.ping().await {
        warn!(error = %e, "redis_unreachable_at_startup");
    }

    let (enqueuer, tasks) = Enqueuer::spawn(
        backend,
        config.redis_queue.clone(),
        config.enqueue_workers,
        config.enqueue_buffer,
        config.enqueue_saturation,
    );

    let addr = format!("{}:{}", config.listen_addr, config.port);
    let app = router(AppState::new(config, enqueuer));

    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "intake_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router held the last enqueuer handle; flush what is buffered
    tasks.drain().await;

    info!("intake_shutdown_complete");

    Ok(())
}
