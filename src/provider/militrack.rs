//! Militrack live-device adapter.
//!
//! Fetches real-time telemetry from the Militrack HTTP API and
//! reconciles its wire schema into [`RawSample`]s through the
//! normalizer. Transport failures surface as provider errors; the
//! harness logs them and retries on the next tick.

use async_trait::async_trait;
use serde::Deserialize;

use super::GpsProvider;
use crate::domain::Imei;
use crate::error::PipelineError;
use crate::normalize::{from_wire, RawSample};

/// Militrack HTTP API client.
#[derive(Debug)]
pub struct MilitrackProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// Fleet telemetry response envelope.
#[derive(Debug, Deserialize)]
struct TelemetryEnvelope {
    #[serde(default)]
    vehicles: Vec<serde_json::Value>,
}

impl MilitrackProvider {
    /// Creates a client for the given API base URL and bearer token.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, PipelineError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?
            .error_for_status()
            .map_err(|e| PipelineError::Provider(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))
    }
}

#[async_trait]
impl GpsProvider for MilitrackProvider {
    fn name(&self) -> &'static str {
        "militrack"
    }

    async fn initialize(&self) -> Result<(), PipelineError> {
        // Probe the API before the first poll so a bad URL or token
        // fails startup instead of silently skipping every tick.
        let status = self.get_json("/status").await?;
        tracing::info!(
            status = status.get("status").and_then(|s| s.as_str()).unwrap_or("unknown"),
            "militrack api connected"
        );
        Ok(())
    }

    async fn fetch_telemetry(&self) -> Result<Vec<RawSample>, PipelineError> {
        let value = self.get_json("/vehicles/telemetry").await?;
        let envelope: TelemetryEnvelope = serde_json::from_value(value)
            .map_err(|e| PipelineError::Provider(format!("malformed telemetry response: {e}")))?;

        let mut batch = Vec::with_capacity(envelope.vehicles.len());
        for wire in &envelope.vehicles {
            match from_wire(wire) {
                Some(raw) => batch.push(raw),
                None => {
                    tracing::warn!("skipping telemetry record without device identity");
                }
            }
        }
        Ok(batch)
    }

    async fn fetch_single(&self, imei: &Imei) -> Result<Option<RawSample>, PipelineError> {
        let value = self.get_json(&format!("/vehicles/{imei}/telemetry")).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(from_wire(&value))
    }

    async fn shutdown(&self) {
        tracing::info!("militrack provider shut down");
    }
}
