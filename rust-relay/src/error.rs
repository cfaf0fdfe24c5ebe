//! Error taxonomy shared by the intake service and the delivery worker.
//!
//! None of these errors ever reach the HTTP caller as a body; they
//! are logged and either absorbed or escalated to a process exit.

use std::time::Duration;

use thiserror::Error;

/// Errors raised anywhere along the relay pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The intake request lacks a required query parameter.
    #[error("url param {0} is missing")]
    MissingParameter(&'static str),

    /// The destination would corrupt the space-delimited record.
    #[error("destination {0:?} contains the field separator")]
    InvalidDestination(String),

    /// Dialing the queue backend failed.
    #[error("queue connection error: {0}")]
    Connection(#[source] redis::RedisError),

    /// The queue backend rejected the configured credential.
    #[error("queue authentication failed: {0}")]
    Auth(#[source] redis::RedisError),

    /// No pooled connection became available in time.
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    /// The pool could not hand out a connection for another reason.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Pushing a record onto the queue failed.
    #[error("cannot put data to queue: {0}")]
    Enqueue(#[source] redis::RedisError),

    /// Popping a record from the queue failed.
    #[error("cannot pop data from queue: {0}")]
    Dequeue(#[source] redis::RedisError),

    /// In-process backend failure (memory queue fault injection).
    #[error("queue backend error: {0}")]
    Backend(String),

    /// The downstream sink cannot currently be reached.
    #[error("downstream sink unreachable: {0}")]
    SinkUnreachable(String),

    /// The downstream sink refused or failed a delivery.
    #[error("downstream delivery failed: {0}")]
    SinkDelivery(String),

    /// A dequeued record does not carry token, destination and body.
    #[error("malformed envelope record: {0:?}")]
    MalformedEnvelope(String),

    /// A network operation exceeded its deadline.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// The intake dispatcher has no spare capacity.
    #[error("enqueue dispatcher is saturated")]
    Saturated,

    /// The intake dispatcher has shut down.
    #[error("enqueue dispatcher is closed")]
    DispatcherClosed,
}

impl RelayError {
    /// Whether the error came from the queue backend rather than from data
    /// or the sink.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            RelayError::Connection(_)
                | RelayError::Auth(_)
                | RelayError::PoolTimeout
                | RelayError::Pool(_)
                | RelayError::Enqueue(_)
                | RelayError::Dequeue(_)
                | RelayError::Backend(_)
                | RelayError::Timeout { .. }
        )
    }
}

/// Convenience alias used across the library.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Run `fut` under `deadline`, mapping expiry to [`RelayError::Timeout`].
pub async fn with_deadline<T, F>(operation: &'static str, deadline: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::Timeout {
            operation,
            elapsed: deadline,
        }),
    }
}
