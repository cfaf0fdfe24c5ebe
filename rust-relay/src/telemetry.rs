//! Structured JSON logging shared by both binaries.

use std::env;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level name: debug, info, warning, error or fatal.
    pub level: String,
    /// Append logs to this file instead of stdout.
    pub path: Option<String>,
}

impl LoggingConfig {
    /// Read `LOG_LEVEL` and `LOG_PATH`.
    ///
    /// Kept apart from [`crate::Config`] so the subscriber is installed
    /// before the rest of the configuration is parsed and can report bad
    /// values.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            path: lookup("LOG_PATH").filter(|p| !p.trim().is_empty()),
        }
    }
}

/// Map a configured level name onto a filter directive.
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warning" | "warn" => "warn",
        "error" | "fatal" => "error",
        _ => "info",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// If the log file cannot be opened, logging falls back to stdout and the
/// failure is reported there.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&config.level)));

    let file = config
        .path
        .as_deref()
        .map(|path| OpenOptions::new().create(true).append(true).open(path));

    match file {
        Some(Ok(file)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        other => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().flatten_event(true))
                .init();

            if let Some(Err(e)) = other {
                error!(
                    path = config.path.as_deref().unwrap_or_default(),
                    error = %e,
                    "log_file_open_failed"
                );
            }
        }
    }
}
