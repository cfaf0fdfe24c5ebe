//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use smsrelay::worker::{RetryPolicy, SinkFailurePolicy, WorkerSettings};
use smsrelay::{DeliverySink, RelayError, Result};

pub const QUEUE: &str = "sms";
pub const DEAD_LETTER: &str = "sms:dead";

/// A call observed by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Check,
    Deliver { body: String, destination: String },
}

/// Sink that records every call and goes unreachable after a fixed number
/// of successful probes.
#[derive(Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    checks_left: Arc<AtomicUsize>,
    fail_deliveries: bool,
}

impl RecordingSink {
    pub fn reachable_for(checks: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            checks_left: Arc::new(AtomicUsize::new(checks)),
            fail_deliveries: false,
        }
    }

    pub fn failing_deliveries(mut self) -> Self {
        self.fail_deliveries = true;
        self
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Deliver { body, destination } => Some((body, destination)),
                SinkEvent::Check => None,
            })
            .collect()
    }

    pub fn check_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == SinkEvent::Check)
            .count()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn check(&self) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Check);
        self.checks_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| RelayError::SinkUnreachable("probe refused".to_string()))
    }

    async fn deliver(&self, body: &str, destination: &str) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Deliver {
            body: body.to_string(),
            destination: destination.to_string(),
        });
        if self.fail_deliveries {
            return Err(RelayError::SinkDelivery("gateway said no".to_string()));
        }
        Ok(())
    }
}

pub fn worker_settings(on_sink_failure: SinkFailurePolicy) -> WorkerSettings {
    WorkerSettings {
        queue: QUEUE.to_string(),
        dead_letter_queue: DEAD_LETTER.to_string(),
        poll_interval: Duration::from_millis(1),
        op_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            base: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts: 3,
        },
        on_sink_failure,
    }
}

/// A shutdown future that never fires.
pub async fn never() {
    std::future::pending::<()>().await
}
