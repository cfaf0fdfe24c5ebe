//! Stored-procedure sink over a PostgreSQL pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use super::DeliverySink;
use crate::error::{RelayError, Result};

/// Delivers by executing a parameterised statement, `$1` bound to the body
/// and `$2` to the destination.
pub struct SqlSink {
    pool: PgPool,
    statement: String,
}

impl SqlSink {
    /// Create the sink without opening a connection. Reachability is
    /// established by the worker's first [`DeliverySink::check`].
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        statement: String,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)
            .map_err(|e| RelayError::SinkUnreachable(e.to_string()))?;

        info!(max_connections, statement = %statement, "sql_sink_created");
        Ok(Self { pool, statement })
    }
}

#[async_trait]
impl DeliverySink for SqlSink {
    async fn check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RelayError::SinkUnreachable(e.to_string()))?;
        debug!("sql_sink_reachable");
        Ok(())
    }

    async fn deliver(&self, body: &str, destination: &str) -> Result<()> {
        sqlx::query(&self.statement)
            .bind(body)
            .bind(destination)
            .execute(&self.pool)
            .await
            .map_err(|e| RelayError::SinkDelivery(e.to_string()))?;
        debug!(destination = %destination, "sql_statement_executed");
        Ok(())
    }
}
