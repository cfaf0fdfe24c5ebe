//! Intake endpoint handlers.
//!
//! These handlers are designed to be extremely fast - they only:
//! 1. Validate the `tel` and `msg` query parameters
//! 2. Build a tagged envelope
//! 3. Hand it to the background dispatcher and return
//!
//! The caller never learns whether the push to Redis succeeded.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{RelayError, Result};
use crate::queue::{generate_token, Envelope};
use crate::web::dispatch::{Dispatched, Enqueuer};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub enqueuer: Enqueuer,
}

impl AppState {
    pub fn new(config: Config, enqueuer: Enqueuer) -> Self {
        Self {
            config: Arc::new(config),
            enqueuer,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Notification Intake
// =============================================================================

/// Query parameters of the intake route.
#[derive(Debug, Default)]
pub struct NotifyParams {
    /// Destination, e.g. a phone number.
    pub tel: Option<String>,
    /// Message body.
    pub msg: Option<String>,
}

impl NotifyParams {
    /// Collect `tel` and `msg` from decoded query pairs. A repeated
    /// parameter keeps its first value; unknown parameters are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "tel" if params.tel.is_none() => params.tel = Some(value),
                "msg" if params.msg.is_none() => params.msg = Some(value),
                _ => {}
            }
        }
        params
    }

    /// Turn the raw parameters into an envelope tagged with a fresh token.
    pub fn into_envelope(self, token_length: usize) -> Result<Envelope> {
        let tel = self.tel.ok_or(RelayError::MissingParameter("tel"))?;
        let msg = self.msg.ok_or(RelayError::MissingParameter("msg"))?;
        Envelope::new(generate_token(token_length), tel, msg)
    }
}

/// Intake endpoint.
///
/// Responds 202 with an empty body once the envelope is handed off, 400 when
/// a parameter is missing or unusable, and 503 when the dispatcher refuses
/// more work.
pub async fn notify(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> StatusCode {
    let params = NotifyParams::from_pairs(pairs);
    let envelope = match params.into_envelope(state.config.token_length) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(error = %e, "intake_request_rejected");
            return StatusCode::BAD_REQUEST;
        }
    };

    let token = envelope.token.clone();
    let destination = envelope.destination.clone();

    match state.enqueuer.dispatch(envelope).await {
        Ok(Dispatched::Queued) => {
            info!(trace_token = %token, destination = %destination, "intake_accepted");
            StatusCode::ACCEPTED
        }
        Ok(Dispatched::Dropped) => StatusCode::ACCEPTED,
        Err(RelayError::Saturated) => {
            warn!(trace_token = %token, destination = %destination, "intake_saturated");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(e) => {
            error!(trace_token = %token, error = %e, "intake_dispatch_failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
