//! In-memory queue backend.
//!
//! Mirrors the Redis list semantics (push to the tail, pop from the head, nil
//! on an empty list) so the worker and intake can run without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::QueueBackend;
use crate::error::{RelayError, Result};

/// In-process queue for tests and local pipelines.
///
/// Clones share the same storage. Failures can be injected for the next
/// `n` pushes or pops to exercise recovery paths.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    lists: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    failing_pops: Arc<AtomicUsize>,
    failing_pushes: Arc<AtomicUsize>,
    pops: Arc<AtomicUsize>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` pops fail with a backend error.
    pub fn fail_next_pops(&self, n: usize) {
        self.failing_pops.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` pushes fail with a backend error.
    pub fn fail_next_pushes(&self, n: usize) {
        self.failing_pushes.store(n, Ordering::SeqCst);
    }

    /// Snapshot of a list, head first.
    pub async fn contents(&self, queue: &str) -> Vec<String> {
        let lists = self.lists.lock().await;
        lists
            .get(queue)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn len(&self, queue: &str) -> usize {
        let lists = self.lists.lock().await;
        lists.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    /// Number of pop attempts, failed ones included.
    pub fn pop_count(&self) -> usize {
        self.pops.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn push(&self, queue: &str, record: &str) -> Result<()> {
        if Self::take_failure(&self.failing_pushes) {
            return Err(RelayError::Backend("injected push failure".to_string()));
        }
        let mut lists = self.lists.lock().await;
        lists
            .entry(queue.to_string())
            .or_default()
            .push_back(record.to_string());
        tracing::debug!(queue = %queue, record = %record, "memory_queue_push");
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        self.pops.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_pops) {
            return Err(RelayError::Backend("injected pop failure".to_string()));
        }
        let mut lists = self.lists.lock().await;
        Ok(lists.get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
