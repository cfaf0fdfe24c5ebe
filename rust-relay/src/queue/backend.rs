//! Durable queue operations.
//!
//! [`QueueBackend`] is the seam between the relay logic and the storage that
//! holds records in flight. [`RedisQueue`] keeps records in a Redis list,
//! pushing on the tail and popping from the head.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::pool::ConnectionPool;
use crate::error::{with_deadline, RelayError, Result};

/// A named FIFO of text records.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append `record` to the tail of `queue`.
    async fn push(&self, queue: &str, record: &str) -> Result<()>;

    /// Remove and return the head of `queue` without blocking. `None` means
    /// the queue is empty.
    async fn pop(&self, queue: &str) -> Result<Option<String>>;

    /// Round-trip to the backend.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl<Q: QueueBackend + ?Sized> QueueBackend for std::sync::Arc<Q> {
    async fn push(&self, queue: &str, record: &str) -> Result<()> {
        (**self).push(queue, record).await
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        (**self).pop(queue).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}

/// Redis list queue backed by the connection pool.
///
/// Each operation leases one connection and returns it when the operation
/// finishes, whether it succeeded or not. Every operation is bounded by
/// `op_timeout`, lease wait included.
#[derive(Clone)]
pub struct RedisQueue {
    pool: ConnectionPool,
    op_timeout: Duration,
}

impl RedisQueue {
    pub fn new(pool: ConnectionPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn push(&self, queue: &str, record: &str) -> Result<()> {
        with_deadline("push", self.op_timeout, async {
            let mut conn = self.pool.acquire().await?;
            let len: i64 = redis::cmd("RPUSH")
                .arg(queue)
                .arg(record)
                .query_async(&mut *conn)
                .await
                .map_err(RelayError::Enqueue)?;
            debug!(queue = %queue, queue_length = len, "redis_rpush");
            Ok(())
        })
        .await
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        with_deadline("pop", self.op_timeout, async {
            let mut conn = self.pool.acquire().await?;
            let record: Option<String> = redis::cmd("LPOP")
                .arg(queue)
                .query_async(&mut *conn)
                .await
                .map_err(RelayError::Dequeue)?;
            Ok(record)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        with_deadline("ping", self.op_timeout, async {
            let mut conn = self.pool.acquire().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(RelayError::Connection)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::pool::PoolConfig;

    fn local_queue() -> RedisQueue {
        let config = PoolConfig {
            host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: 6379,
            password: std::env::var("REDIS_PASSWORD").ok(),
            max_active: 4,
            max_idle: 2,
            wait_timeout: Duration::from_secs(2),
        };
        RedisQueue::new(ConnectionPool::connect(&config).unwrap(), Duration::from_secs(2))
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_push_pop_fifo() {
        let queue = local_queue();
        let name = format!("smsrelay-test-{}", std::process::id());

        queue.push(&name, "a 1 first").await.unwrap();
        queue.push(&name, "b 2 second").await.unwrap();

        assert_eq!(queue.pop(&name).await.unwrap().as_deref(), Some("a 1 first"));
        assert_eq!(queue.pop(&name).await.unwrap().as_deref(), Some("b 2 second"));
        assert_eq!(queue.pop(&name).await.unwrap(), None);
        assert_eq!(queue.pool().status().leased, 0);
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_fast() {
        let config = PoolConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            password: None,
            max_active: 1,
            max_idle: 1,
            wait_timeout: Duration::from_millis(500),
        };
        let queue = RedisQueue::new(
            ConnectionPool::connect(&config).unwrap(),
            Duration::from_secs(2),
        );

        let err = queue.pop("anything").await.err().unwrap();
        assert!(err.is_backend());
        assert_eq!(queue.pool().status().leased, 0);
    }
}
