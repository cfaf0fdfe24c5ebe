//! Bounded pool of authenticated Redis connections.
//!
//! The pool is built on `deadpool::managed`. [`RedisConnector`] supplies the
//! dial sequence (connect, then `AUTH` when a password is configured) and the
//! `PING` liveness probe that runs before an idle connection is handed out
//! again. [`ConnectionPool`] adds the idle cap on top of deadpool's active cap.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use deadpool::managed::{self, Manager, Metrics, Object, Pool, PoolError, RecycleResult};
use deadpool::Runtime;
use redis::aio::MultiplexedConnection;
use tracing::{debug, error, info};

use crate::error::{RelayError, Result};

/// Pool sizing and credentials.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Redis host name or address.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Optional credential sent with `AUTH` after dialing.
    pub password: Option<String>,
    /// Cap on concurrently leased connections.
    pub max_active: usize,
    /// Cap on idle connections kept for reuse.
    pub max_idle: usize,
    /// How long `acquire` waits on an exhausted pool.
    pub wait_timeout: Duration,
}

impl PoolConfig {
    /// Connection URL without credentials; authentication is explicit.
    /// IPv6 literals are bracketed.
    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("redis://[{}]:{}/", self.host, self.port)
        } else {
            format!("redis://{}:{}/", self.host, self.port)
        }
    }
}

/// Dials and validates Redis connections for the pool.
pub struct RedisConnector {
    client: redis::Client,
    password: Option<String>,
}

impl RedisConnector {
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let client = redis::Client::open(config.url()).map_err(RelayError::Connection)?;
        Ok(Self {
            client,
            password: config.password.clone().filter(|p| !p.is_empty()),
        })
    }
}

impl Manager for RedisConnector {
    type Type = MultiplexedConnection;
    type Error = RelayError;

    async fn create(&self) -> Result<MultiplexedConnection> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "redis_connect_failed");
                return Err(RelayError::Connection(e));
            }
        };
        debug!("redis_connection_established");

        if let Some(password) = &self.password {
            let auth: redis::RedisResult<()> =
                redis::cmd("AUTH").arg(password).query_async(&mut conn).await;
            if let Err(e) = auth {
                error!(error = %e, "redis_auth_failed");
                drop(conn);
                return Err(RelayError::Auth(e));
            }
            debug!("redis_password_accepted");
        }

        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut MultiplexedConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<RelayError> {
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(conn).await;
        match pong {
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(error = %e, "redis_liveness_probe_failed");
                Err(managed::RecycleError::Backend(RelayError::Connection(e)))
            }
        }
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub leased: usize,
    pub idle: usize,
    pub max_active: usize,
    pub max_idle: usize,
}

/// A bounded connection pool with separate active and idle caps.
pub struct ConnectionPool<M: Manager = RedisConnector> {
    inner: Pool<M>,
    max_idle: usize,
}

impl<M: Manager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            max_idle: self.max_idle,
        }
    }
}

impl ConnectionPool<RedisConnector> {
    /// Build the Redis pool. No connection is dialed until the first lease.
    pub fn connect(config: &PoolConfig) -> Result<Self> {
        let manager = RedisConnector::new(config)?;
        let pool = Self::with_manager(manager, config.max_active, config.max_idle, config.wait_timeout)?;

        info!(
            host = %config.host,
            port = config.port,
            max_active = config.max_active,
            max_idle = config.max_idle,
            auth_configured = config.password.is_some(),
            "redis_pool_created"
        );

        Ok(pool)
    }
}

impl<M: Manager> ConnectionPool<M>
where
    M::Error: Into<RelayError> + std::fmt::Display,
{
    /// Build a pool around any connection manager.
    pub fn with_manager(
        manager: M,
        max_active: usize,
        max_idle: usize,
        wait_timeout: Duration,
    ) -> Result<Self> {
        let inner = Pool::builder(manager)
            .max_size(max_active.max(1))
            .wait_timeout(Some(wait_timeout))
            .create_timeout(Some(wait_timeout))
            .recycle_timeout(Some(wait_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| RelayError::Pool(e.to_string()))?;

        Ok(Self { inner, max_idle })
    }

    /// Lease a connection, waiting while the pool is exhausted.
    ///
    /// Idle connections are probed before reuse; a failed probe discards the
    /// connection and a fresh one is dialed in its place.
    pub async fn acquire(&self) -> Result<PooledConnection<M>> {
        match self.inner.get().await {
            Ok(conn) => Ok(PooledConnection {
                conn: Some(conn),
                pool: self.clone(),
            }),
            Err(PoolError::Timeout(_)) => Err(RelayError::PoolTimeout),
            Err(PoolError::Backend(e)) => Err(e.into()),
            Err(e) => Err(RelayError::Pool(e.to_string())),
        }
    }

    /// Current leased and idle counts.
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        let available = status.available.max(0) as usize;
        PoolStatus {
            leased: status.size.saturating_sub(available),
            idle: available,
            max_active: status.max_size,
            max_idle: self.max_idle,
        }
    }

    /// Close every idle connection beyond the idle cap.
    fn trim_idle(&self) {
        let kept = Cell::new(0usize);
        let _ = self.inner.retain(|_, _| {
            if kept.get() < self.max_idle {
                kept.set(kept.get() + 1);
                true
            } else {
                false
            }
        });
    }
}

/// A leased connection. Dropping it returns the connection to the pool.
pub struct PooledConnection<M: Manager = RedisConnector>
where
    M::Error: Into<RelayError> + std::fmt::Display,
{
    conn: Option<Object<M>>,
    pool: ConnectionPool<M>,
}

impl<M: Manager> Deref for PooledConnection<M>
where
    M::Error: Into<RelayError> + std::fmt::Display,
{
    type Target = M::Type;

    fn deref(&self) -> &M::Type {
        // Only emptied inside Drop.
        self.conn.as_ref().map(|c| &**c).unwrap_or_else(|| unreachable!())
    }
}

impl<M: Manager> DerefMut for PooledConnection<M>
where
    M::Error: Into<RelayError> + std::fmt::Display,
{
    fn deref_mut(&mut self) -> &mut M::Type {
        self.conn.as_mut().map(|c| &mut **c).unwrap_or_else(|| unreachable!())
    }
}

impl<M: Manager> Drop for PooledConnection<M>
where
    M::Error: Into<RelayError> + std::fmt::Display,
{
    fn drop(&mut self) {
        drop(self.conn.take());
        self.pool.trim_idle();
    }
}
