//! HTTP gateway sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::DeliverySink;
use crate::error::{RelayError, Result};

/// JSON body posted to the gateway.
#[derive(Debug, Serialize)]
pub struct DeliveryRequest<'a> {
    pub destination: &'a str,
    pub body: &'a str,
}

/// Delivers by POSTing JSON to a gateway; any 2xx counts as success.
pub struct HttpSink {
    client: Client,
    send_url: String,
    health_url: String,
}

impl HttpSink {
    /// `health_url` falls back to `send_url` when not given.
    pub fn new(send_url: String, health_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::SinkUnreachable(e.to_string()))?;

        let health_url = health_url.unwrap_or_else(|| send_url.clone());
        Ok(Self {
            client,
            send_url,
            health_url,
        })
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn check(&self) -> Result<()> {
        let resp = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| RelayError::SinkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::SinkUnreachable(format!(
                "health probe returned {}",
                status
            )));
        }
        debug!(status_code = status.as_u16(), "http_sink_reachable");
        Ok(())
    }

    async fn deliver(&self, body: &str, destination: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.send_url)
            .json(&DeliveryRequest { destination, body })
            .send()
            .await
            .map_err(|e| RelayError::SinkDelivery(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::SinkDelivery(format!(
                "gateway returned {}",
                status
            )));
        }
        debug!(destination = %destination, status_code = status.as_u16(), "http_sink_delivered");
        Ok(())
    }
}
