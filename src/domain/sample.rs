//! Canonical telemetry sample and the classified vehicle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::LatLng;
use super::ids::Imei;

/// One normalized telemetry reading for a vehicle at a point in time.
///
/// Produced by the normalizer from a provider payload or a pushed
/// ingestion request. Immutable once created; engines receive shared
/// references and the previous sample as an owned copy from the runtime
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Device identity the reading came from.
    pub imei: Imei,
    /// Device-reported time of the reading.
    pub timestamp: DateTime<Utc>,
    /// Latitude in decimal degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in decimal degrees, `[-180, 180]`.
    pub longitude: f64,
    /// Speed in km/h, `>= 0`.
    pub speed: f64,
    /// Ignition line state.
    pub ignition: bool,
    /// Device motion sensor flag, when reported.
    pub motion: Option<bool>,
    /// Fuel level in liters, when the vehicle has a fuel sensor.
    pub fuel_level: Option<f64>,
    /// Dash odometer reading in kilometers, when reported.
    pub odometer: Option<f64>,
    /// Opaque original wire payload, kept for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl TelemetrySample {
    /// Returns the sample position as a [`LatLng`].
    #[must_use]
    pub const fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Motion classification of a vehicle derived from one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    /// Speed above the moving threshold, or the motion flag is set.
    Moving,
    /// Crawling below the moving threshold, or stationary with ignition on.
    Idle,
    /// Stationary with ignition off.
    Stopped,
}

impl VehicleState {
    /// Stable string form used in broadcast payloads and vehicle rows.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Moving => "moving",
            Self::Idle => "idle",
            Self::Stopped => "stopped",
        }
    }
}
