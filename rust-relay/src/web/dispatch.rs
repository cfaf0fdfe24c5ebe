//! Background enqueue dispatcher.
//!
//! Handlers never wait on Redis. They hand envelopes to a bounded channel
//! that a fixed set of tasks drains into the queue backend. When the channel
//! is full the [`SaturationPolicy`] decides what the handler does.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result};
use crate::queue::{Envelope, QueueBackend};

/// Behaviour when every dispatcher slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaturationPolicy {
    /// Refuse the request.
    Reject,
    /// Accept the request and discard the envelope.
    Drop,
    /// Hold the request until a slot frees up.
    Wait,
}

impl FromStr for SaturationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(SaturationPolicy::Reject),
            "drop" => Ok(SaturationPolicy::Drop),
            "wait" | "queue" => Ok(SaturationPolicy::Wait),
            other => Err(format!("unknown saturation policy: {}", other)),
        }
    }
}

/// Outcome of handing an envelope to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Buffered for a background push.
    Queued,
    /// Discarded under [`SaturationPolicy::Drop`].
    Dropped,
}

/// Cloneable handle used by request handlers.
#[derive(Clone)]
pub struct Enqueuer {
    tx: mpsc::Sender<Envelope>,
    policy: SaturationPolicy,
}

/// Owns the background tasks; used to drain them at shutdown.
pub struct EnqueuerTasks {
    handles: Vec<JoinHandle<()>>,
}

impl Enqueuer {
    /// Start `workers` tasks pushing onto `queue` through `backend`.
    pub fn spawn<Q>(
        backend: Q,
        queue: String,
        workers: usize,
        capacity: usize,
        policy: SaturationPolicy,
    ) -> (Self, EnqueuerTasks)
    where
        Q: QueueBackend + Clone + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let queue: Arc<str> = queue.into();

        let handles = (0..workers.max(1))
            .map(|id| {
                let backend = backend.clone();
                let rx = Arc::clone(&rx);
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { push_loop(id, backend, rx, queue).await })
            })
            .collect();

        info!(workers = workers.max(1), capacity = capacity.max(1), policy = ?policy, "enqueuer_started");

        (Self { tx, policy }, EnqueuerTasks { handles })
    }

    /// Hand `envelope` off for a background push.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<Dispatched> {
        match self.policy {
            SaturationPolicy::Wait => self
                .tx
                .send(envelope)
                .await
                .map(|_| Dispatched::Queued)
                .map_err(|_| RelayError::DispatcherClosed),
            SaturationPolicy::Reject | SaturationPolicy::Drop => match self.tx.try_send(envelope) {
                Ok(()) => Ok(Dispatched::Queued),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(RelayError::DispatcherClosed),
                Err(mpsc::error::TrySendError::Full(envelope)) => {
                    if self.policy == SaturationPolicy::Drop {
                        warn!(
                            trace_token = %envelope.token,
                            destination = %envelope.destination,
                            "enqueue_dropped_saturated"
                        );
                        Ok(Dispatched::Dropped)
                    } else {
                        Err(RelayError::Saturated)
                    }
                }
            },
        }
    }
}

impl EnqueuerTasks {
    /// Wait for every buffered envelope to be pushed. Completes once all
    /// [`Enqueuer`] handles are dropped and the buffer is empty.
    pub async fn drain(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "enqueuer_task_panicked");
            }
        }
        info!("enqueuer_drained");
    }
}

async fn push_loop<Q: QueueBackend>(
    id: usize,
    backend: Q,
    rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    queue: Arc<str>,
) {
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(envelope) = next else {
            debug!(worker = id, "enqueuer_worker_exiting");
            return;
        };

        let record = envelope.encode();
        match backend.push(&queue, &record).await {
            Ok(()) => debug!(
                worker = id,
                queue = %queue,
                trace_token = %envelope.token,
                record = %record,
                "enqueue_completed"
            ),
            Err(e) => error!(
                worker = id,
                queue = %queue,
                trace_token = %envelope.token,
                destination = %envelope.destination,
                error = %e,
                "enqueue_failed"
            ),
        }
    }
}
