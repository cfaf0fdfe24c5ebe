//! Configuration module for environment variable parsing.
//!
//! Both binaries read the same variables; each uses the subset it needs.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::queue::{PoolConfig, DEFAULT_TOKEN_LENGTH};
use crate::sink::{SinkConfig, SinkKind};
use crate::web::SaturationPolicy;
use crate::worker::{RetryPolicy, SinkFailurePolicy, WorkerSettings};

/// Application configuration loaded from environment variables.
///
/// Logging settings are read separately by
/// [`LoggingConfig::from_env`](crate::telemetry::LoggingConfig::from_env) so
/// that invalid values here are reported once the subscriber is running.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Redis queue
    // =========================================================================
    /// Redis host
    pub redis_host: String,

    /// Redis port
    pub redis_port: u16,

    /// Optional Redis password, sent with AUTH on every new connection
    pub redis_password: Option<String>,

    /// Name of the Redis list used as the queue
    pub redis_queue: String,

    /// Maximum number of concurrently leased connections
    pub redis_max_active: usize,

    /// Maximum number of idle connections retained
    pub redis_max_idle: usize,

    /// How long to wait for a connection when the pool is exhausted
    pub redis_wait_timeout_ms: u64,

    /// Deadline for each push, pop and sink call
    pub queue_op_timeout_ms: u64,

    // =========================================================================
    // Intake
    // =========================================================================
    /// Address for the intake server to listen on
    pub listen_addr: String,

    /// Port for the intake server to listen on
    pub port: u16,

    /// Route of the intake endpoint
    pub handler_uri: String,

    /// Length of generated trace tokens
    pub token_length: usize,

    /// Number of background enqueue tasks
    pub enqueue_workers: usize,

    /// Number of envelopes buffered ahead of the enqueue tasks
    pub enqueue_buffer: usize,

    /// What to do when the enqueue buffer is full
    pub enqueue_saturation: SaturationPolicy,

    // =========================================================================
    // Delivery sink
    // =========================================================================
    /// Which sink implementation to use
    pub sink_kind: SinkKind,

    /// PostgreSQL connection string for the SQL sink
    pub database_url: String,

    /// Statement executed per delivery ($1 = body, $2 = destination)
    pub sink_statement: String,

    /// Maximum number of SQL sink connections
    pub db_max_connections: u32,

    /// Gateway endpoint for the HTTP sink
    pub sink_http_url: String,

    /// Reachability probe URL for the HTTP sink
    pub sink_health_url: Option<String>,

    // =========================================================================
    // Worker
    // =========================================================================
    /// Sleep between polls of an empty queue
    pub poll_interval_ms: u64,

    /// Consecutive pop failures tolerated before exiting
    pub pop_retry_max_attempts: u32,

    /// First pop retry delay
    pub pop_retry_base_ms: u64,

    /// Largest pop retry delay
    pub pop_retry_max_ms: u64,

    /// What to do with records the sink rejects
    pub sink_failure_policy: SinkFailurePolicy,

    /// Dead-letter list name
    pub dead_letter_queue: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let redis_queue = env::var("REDIS_QUEUE").unwrap_or_else(|_| "smsrelay".to_string());

        Config {
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            redis_port: parse_env("REDIS_PORT", 6379),
            redis_password: non_empty("REDIS_PASSWORD"),
            redis_max_active: parse_env("REDIS_MAX_ACTIVE", 16),
            redis_max_idle: parse_env("REDIS_MAX_IDLE", 4),
            redis_wait_timeout_ms: parse_env("REDIS_WAIT_TIMEOUT_MS", 5000),
            queue_op_timeout_ms: parse_env("QUEUE_OP_TIMEOUT_MS", 5000),

            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("PORT", 8080),
            handler_uri: normalize_route(&env::var("HANDLER_URI").unwrap_or_default()),
            token_length: parse_env("TOKEN_LENGTH", DEFAULT_TOKEN_LENGTH),
            enqueue_workers: parse_env("ENQUEUE_WORKERS", 4),
            enqueue_buffer: parse_env("ENQUEUE_BUFFER", 1024),
            enqueue_saturation: parse_env("ENQUEUE_SATURATION", SaturationPolicy::Reject),

            sink_kind: parse_env("SINK_KIND", SinkKind::Sql),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/notifications".to_string()),
            sink_statement: env::var("SINK_STATEMENT")
                .unwrap_or_else(|_| "SELECT send_notification($1, $2)".to_string()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 4),
            sink_http_url: env::var("SINK_HTTP_URL")
                .unwrap_or_else(|_| "http://localhost:9000/send".to_string()),
            sink_health_url: non_empty("SINK_HEALTH_URL"),

            poll_interval_ms: parse_env("POLL_INTERVAL_MS", 1000),
            pop_retry_max_attempts: parse_env("POP_RETRY_MAX_ATTEMPTS", 5),
            pop_retry_base_ms: parse_env("POP_RETRY_BASE_MS", 500),
            pop_retry_max_ms: parse_env("POP_RETRY_MAX_MS", 30_000),
            sink_failure_policy: parse_env("SINK_FAILURE_POLICY", SinkFailurePolicy::Drop),
            dead_letter_queue: env::var("DEAD_LETTER_QUEUE")
                .unwrap_or_else(|_| format!("{}:dead", redis_queue)),

            redis_queue,
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_op_timeout_ms)
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            host: self.redis_host.clone(),
            port: self.redis_port,
            password: self.redis_password.clone(),
            max_active: self.redis_max_active,
            max_idle: self.redis_max_idle,
            wait_timeout: Duration::from_millis(self.redis_wait_timeout_ms),
        }
    }

    pub fn sink(&self) -> SinkConfig {
        SinkConfig {
            kind: self.sink_kind,
            database_url: self.database_url.clone(),
            statement: self.sink_statement.clone(),
            max_connections: self.db_max_connections,
            http_url: self.sink_http_url.clone(),
            health_url: self.sink_health_url.clone(),
            timeout: self.op_timeout(),
        }
    }

    pub fn worker(&self) -> WorkerSettings {
        WorkerSettings {
            queue: self.redis_queue.clone(),
            dead_letter_queue: self.dead_letter_queue.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            op_timeout: self.op_timeout(),
            retry: RetryPolicy {
                base: Duration::from_millis(self.pop_retry_base_ms),
                max_delay: Duration::from_millis(self.pop_retry_max_ms),
                max_attempts: self.pop_retry_max_attempts,
            },
            on_sink_failure: self.sink_failure_policy,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// invalid.
fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            warn!(env_var = name, value = %raw, error = %e, "Invalid value, using default");
            default
        }
    }
}

/// Read an environment variable, treating an empty value as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Routes must start with a slash; an empty route means the root.
fn normalize_route(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_valid() {
        env::set_var("SMSRELAY_TEST_PORT", "6380");
        assert_eq!(parse_env("SMSRELAY_TEST_PORT", 6379u16), 6380);
        env::remove_var("SMSRELAY_TEST_PORT");
    }

    #[test]
    fn test_parse_env_invalid_uses_default() {
        env::set_var("SMSRELAY_TEST_BAD", "not-a-number");
        assert_eq!(parse_env("SMSRELAY_TEST_BAD", 16usize), 16);
        env::remove_var("SMSRELAY_TEST_BAD");
    }

    #[test]
    fn test_parse_env_policy() {
        env::set_var("SMSRELAY_TEST_POLICY", "dead_letter");
        assert_eq!(
            parse_env("SMSRELAY_TEST_POLICY", SinkFailurePolicy::Drop),
            SinkFailurePolicy::DeadLetter
        );
        env::remove_var("SMSRELAY_TEST_POLICY");
    }

    #[test]
    fn test_parse_env_default() {
        assert_eq!(parse_env("SMSRELAY_TEST_UNSET", 1000u64), 1000);
    }

    #[test]
    fn test_non_empty() {
        env::set_var("SMSRELAY_TEST_EMPTY", "");
        assert_eq!(non_empty("SMSRELAY_TEST_EMPTY"), None);
        env::remove_var("SMSRELAY_TEST_EMPTY");
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route(""), "/");
        assert_eq!(normalize_route("sms"), "/sms");
        assert_eq!(normalize_route("/nagios/sms"), "/nagios/sms");
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::from_env();
        let worker = config.worker();
        assert_eq!(worker.queue, config.redis_queue);
        assert_eq!(worker.op_timeout, config.op_timeout());
        assert_eq!(config.pool().max_active, config.redis_max_active);
    }
}
