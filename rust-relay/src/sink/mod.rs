//! Downstream delivery sinks.
//!
//! The worker treats the sink as a black box: it can be probed for
//! reachability and asked to deliver a body to a destination.

pub mod http;
pub mod sql;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use http::HttpSink;
pub use sql::SqlSink;

/// The external mechanism that finally executes a notification.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Probe whether the sink can currently accept deliveries.
    async fn check(&self) -> Result<()>;

    /// Deliver `body` to `destination`.
    async fn deliver(&self, body: &str, destination: &str) -> Result<()>;
}

#[async_trait]
impl DeliverySink for Box<dyn DeliverySink> {
    async fn check(&self) -> Result<()> {
        (**self).check().await
    }

    async fn deliver(&self, body: &str, destination: &str) -> Result<()> {
        (**self).deliver(body, destination).await
    }
}

/// Which sink implementation the worker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Stored-procedure call over a SQL connection pool.
    Sql,
    /// JSON POST to an HTTP gateway.
    Http,
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" | "postgres" | "db" => Ok(SinkKind::Sql),
            "http" | "https" => Ok(SinkKind::Http),
            other => Err(format!("unknown sink kind: {}", other)),
        }
    }
}

/// Settings for building a sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub database_url: String,
    pub statement: String,
    pub max_connections: u32,
    pub http_url: String,
    pub health_url: Option<String>,
    pub timeout: Duration,
}

/// Build the configured sink.
pub fn build_sink(config: &SinkConfig) -> Result<Box<dyn DeliverySink>> {
    match config.kind {
        SinkKind::Sql => Ok(Box::new(SqlSink::connect_lazy(
            &config.database_url,
            config.max_connections,
            config.timeout,
            config.statement.clone(),
        )?)),
        SinkKind::Http => Ok(Box::new(HttpSink::new(
            config.http_url.clone(),
            config.health_url.clone(),
            config.timeout,
        )?)),
    }
}
