//! SMSRelay Worker - sequential delivery from the Redis queue to the sink.
//!
//! This worker pops one record at a time from the configured Redis list,
//! decodes it, and hands the body and destination to the downstream sink.
//! It exits non-zero when the sink becomes unreachable or the queue keeps
//! failing, so a supervisor can restart it.

use anyhow::{anyhow, Context, Result};
use tracing::info;

use smsrelay::telemetry::{self, LoggingConfig};
use smsrelay::util::shutdown_signal;
use smsrelay::{build_sink, Config, ConnectionPool, DeliveryWorker, RedisQueue};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging first so config warnings are kept
    telemetry::init(&LoggingConfig::from_env());

    // Load configuration from environment
    let config = Config::from_env();

    info!("worker_starting");
    info!(
        redis_host = %config.redis_host,
        redis_port = config.redis_port,
        queue = %config.redis_queue,
        sink_kind = ?config.sink_kind,
        poll_interval_ms = config.poll_interval_ms,
        sink_failure_policy = ?config.sink_failure_policy,
        "config_loaded"
    );

    let pool = ConnectionPool::connect(&config.pool()).context("Failed to create Redis pool")?;
    let backend = RedisQueue::new(pool, config.op_timeout());
    let sink = build_sink(&config.sink()).context("Failed to create delivery sink")?;

    let worker = DeliveryWorker::new(backend, sink, config.worker());
    let exit = worker.run(shutdown_signal()).await;

    if exit.is_fatal() {
        return Err(anyhow!("worker stopped: {:?}", exit));
    }

    info!("worker_shutdown_complete");
    Ok(())
}
