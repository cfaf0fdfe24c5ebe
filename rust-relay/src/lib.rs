//! SMSRelay - queue-backed notification relay.
//!
//! This library provides shared modules for the two SMSRelay binaries:
//! - `smsrelay-intake`: Thin web server accepting `tel`/`msg` requests
//! - `smsrelay-worker`: Sequential consumer delivering to the downstream sink
//!
//! ## Architecture
//!
//! ```text
//! HTTP → Intake → Redis list → Worker → sink (stored procedure / HTTP gateway)
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod sink;
pub mod telemetry;
pub mod util;
pub mod web;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use error::{RelayError, Result};
pub use queue::{
    ConnectionPool, Envelope, MemoryQueue, PoolConfig, QueueBackend, RedisQueue,
};
pub use sink::{build_sink, DeliverySink, HttpSink, SinkKind, SqlSink};
pub use web::AppState;
pub use worker::{DeliveryWorker, RetryPolicy, SinkFailurePolicy, WorkerExit, WorkerSettings};
