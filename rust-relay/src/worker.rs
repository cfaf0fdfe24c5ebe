//! Delivery worker - the sequential consume loop.
//!
//! One message is in flight at a time. Each iteration probes the sink, pops
//! one record, and hands it to the sink. The loop is an explicit state
//! machine:
//!
//! ```text
//! CheckSink ──unreachable──► Fatal
//!     │
//!     ▼
//!  Dequeue ──empty──► Backoff ──► CheckSink
//!     │  └──error──► Retry ──► CheckSink   (Fatal once attempts run out)
//!     ▼
//!  Process ──► CheckSink
//!     └──requeued──► Backoff
//! ```

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{with_deadline, RelayError};
use crate::queue::{decode, QueueBackend};
use crate::sink::DeliverySink;

/// What to do with a record the sink could not deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFailurePolicy {
    /// Log and discard; the message is consumed.
    Drop,
    /// Push the record back onto the tail of the work queue.
    Requeue,
    /// Push the record onto the dead-letter queue.
    DeadLetter,
}

impl FromStr for SinkFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drop" => Ok(SinkFailurePolicy::Drop),
            "requeue" => Ok(SinkFailurePolicy::Requeue),
            "dead_letter" | "deadletter" => Ok(SinkFailurePolicy::DeadLetter),
            other => Err(format!("unknown sink failure policy: {}", other)),
        }
    }
}

/// Exponential backoff for consecutive pop failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before the worker gives up.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delay before retrying after the `attempt`-th consecutive failure
    /// (1-based): `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Work queue name.
    pub queue: String,
    /// Destination for undeliverable records under `DeadLetter`.
    pub dead_letter_queue: String,
    /// Constant sleep when the queue is empty.
    pub poll_interval: Duration,
    /// Deadline for each pop, push and sink call.
    pub op_timeout: Duration,
    pub retry: RetryPolicy,
    pub on_sink_failure: SinkFailurePolicy,
}

/// Why the worker loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// A shutdown signal arrived.
    Shutdown,
    /// The sink probe failed; nothing more can be delivered.
    SinkUnreachable(String),
    /// Popping kept failing past the retry ceiling.
    RetriesExhausted { attempts: u32, last_error: String },
}

impl WorkerExit {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WorkerExit::Shutdown)
    }
}

#[derive(Debug)]
enum WorkerState {
    CheckSink,
    Dequeue,
    Process(String),
    Backoff,
    Retry(Duration),
    Fatal(WorkerExit),
}

/// Sequential consumer relaying queue records into a sink.
pub struct DeliveryWorker<Q, S> {
    backend: Q,
    sink: S,
    settings: WorkerSettings,
}

impl<Q, S> DeliveryWorker<Q, S>
where
    Q: QueueBackend,
    S: DeliverySink,
{
    pub fn new(backend: Q, sink: S, settings: WorkerSettings) -> Self {
        Self {
            backend,
            sink,
            settings,
        }
    }

    /// Run until `shutdown` resolves or a fatal condition is reached.
    ///
    /// Shutdown is honoured between messages and during sleeps, never in the
    /// middle of a delivery.
    pub async fn run<F>(&self, shutdown: F) -> WorkerExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut state = WorkerState::CheckSink;
        let mut failures: u32 = 0;

        info!(
            queue = %self.settings.queue,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            on_sink_failure = ?self.settings.on_sink_failure,
            "worker_ready"
        );

        loop {
            state = match state {
                WorkerState::CheckSink => {
                    if shutdown.as_mut().now_or_never().is_some() {
                        WorkerState::Fatal(WorkerExit::Shutdown)
                    } else {
                        self.check_sink().await
                    }
                }
                WorkerState::Dequeue => {
                    let popped = with_deadline(
                        "pop",
                        self.settings.op_timeout,
                        self.backend.pop(&self.settings.queue),
                    )
                    .await;

                    match popped {
                        Ok(Some(record)) if !record.is_empty() => {
                            failures = 0;
                            WorkerState::Process(record)
                        }
                        Ok(_) => {
                            failures = 0;
                            WorkerState::Backoff
                        }
                        Err(e) => {
                            failures += 1;
                            self.on_pop_error(e, failures)
                        }
                    }
                }
                WorkerState::Process(record) => self.process(&record).await,
                WorkerState::Backoff => {
                    debug!(sleep_ms = self.settings.poll_interval.as_millis() as u64, "queue_empty");
                    tokio::select! {
                        _ = shutdown.as_mut() => WorkerState::Fatal(WorkerExit::Shutdown),
                        _ = sleep(self.settings.poll_interval) => WorkerState::CheckSink,
                    }
                }
                WorkerState::Retry(delay) => {
                    tokio::select! {
                        _ = shutdown.as_mut() => WorkerState::Fatal(WorkerExit::Shutdown),
                        _ = sleep(delay) => WorkerState::CheckSink,
                    }
                }
                WorkerState::Fatal(exit) => {
                    match &exit {
                        WorkerExit::Shutdown => info!("worker_stopping"),
                        other => error!(reason = ?other, "worker_fatal"),
                    }
                    return exit;
                }
            };
        }
    }

    async fn check_sink(&self) -> WorkerState {
        match with_deadline("sink_check", self.settings.op_timeout, self.sink.check()).await {
            Ok(()) => {
                debug!("sink_reachable");
                WorkerState::Dequeue
            }
            Err(e) => {
                error!(error = %e, "sink_unreachable");
                WorkerState::Fatal(WorkerExit::SinkUnreachable(e.to_string()))
            }
        }
    }

    fn on_pop_error(&self, e: RelayError, attempt: u32) -> WorkerState {
        let retry = &self.settings.retry;
        if attempt >= retry.max_attempts {
            error!(
                queue = %self.settings.queue,
                attempts = attempt,
                error = %e,
                "dequeue_retries_exhausted"
            );
            return WorkerState::Fatal(WorkerExit::RetriesExhausted {
                attempts: attempt,
                last_error: e.to_string(),
            });
        }

        let delay = retry.delay(attempt);
        error!(
            queue = %self.settings.queue,
            attempt = attempt,
            max_attempts = retry.max_attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %e,
            "dequeue_failed"
        );
        WorkerState::Retry(delay)
    }

    /// Decode one record and hand it to the sink. The record is consumed
    /// whatever the outcome, unless the failure policy puts it back.
    ///
    /// A requeued record waits out one poll interval before the next pop so
    /// a refusing sink is not retried in a tight loop.
    async fn process(&self, record: &str) -> WorkerState {
        let envelope = match decode(record) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return WorkerState::CheckSink,
            Err(e) => {
                warn!(error = %e, "envelope_malformed");
                if self.settings.on_sink_failure == SinkFailurePolicy::DeadLetter {
                    self.push_to(&self.settings.dead_letter_queue, record, "dead_lettered")
                        .await;
                }
                return WorkerState::CheckSink;
            }
        };

        info!(
            trace_token = %envelope.token,
            destination = %envelope.destination,
            body_length = envelope.body.len(),
            "message_dequeued"
        );

        let delivered = with_deadline(
            "deliver",
            self.settings.op_timeout,
            self.sink.deliver(&envelope.body, &envelope.destination),
        )
        .await;

        match delivered {
            Ok(()) => {
                info!(
                    trace_token = %envelope.token,
                    destination = %envelope.destination,
                    "message_delivered"
                );
                WorkerState::CheckSink
            }
            Err(e) => {
                error!(
                    trace_token = %envelope.token,
                    destination = %envelope.destination,
                    error = %e,
                    "delivery_failed"
                );
                match self.settings.on_sink_failure {
                    SinkFailurePolicy::Drop => {
                        warn!(trace_token = %envelope.token, "message_dropped");
                        WorkerState::CheckSink
                    }
                    SinkFailurePolicy::Requeue => {
                        self.push_to(&self.settings.queue, record, "message_requeued")
                            .await;
                        WorkerState::Backoff
                    }
                    SinkFailurePolicy::DeadLetter => {
                        self.push_to(&self.settings.dead_letter_queue, record, "dead_lettered")
                            .await;
                        WorkerState::CheckSink
                    }
                }
            }
        }
    }

    async fn push_to(&self, queue: &str, record: &str, event: &'static str) {
        let pushed = with_deadline(
            "push",
            self.settings.op_timeout,
            self.backend.push(queue, record),
        )
        .await;

        match pushed {
            Ok(()) => info!(queue = %queue, event = event, "record_repushed"),
            Err(e) => error!(queue = %queue, event = event, error = %e, "record_repush_failed"),
        }
    }
}
