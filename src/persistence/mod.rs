//! Persistence collaborator: vehicle lookup and record storage.
//!
//! The pipeline treats storage as a record store behind the
//! [`TelemetryStore`] trait: sample/event/trip writes, vehicle position
//! updates, and read-only geofence/vehicle lookups. The concrete
//! implementations are [`postgres::PostgresStore`] for production and
//! [`memory::MemoryStore`] for tests and the simulator harness.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Alert, AlertId, FuelEvent, Geofence, GeofenceEvent, Imei, TelemetrySample, Trip, TripId,
    VehicleId, VehicleState,
};
use crate::error::PipelineError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Administrative status of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    /// Tracked and polled.
    Active,
    /// Registered but not polled.
    Inactive,
    /// Temporarily out of service.
    Maintenance,
}

impl VehicleStatus {
    /// Stable string form, matching the persisted status column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Maintenance => "maintenance",
        }
    }

    /// Parses the persisted string form; unknown values map to inactive.
    #[must_use]
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "maintenance" => Self::Maintenance,
            _ => Self::Inactive,
        }
    }
}

/// Read-only vehicle row consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRecord {
    /// Internal vehicle identifier.
    pub id: VehicleId,
    /// Device IMEI.
    pub imei: Imei,
    /// Registration/plate number, when known.
    pub registration_no: Option<String>,
    /// Administrative status.
    pub status: VehicleStatus,
}

impl VehicleRecord {
    /// Display label for logs: registration number when present,
    /// otherwise the IMEI.
    #[must_use]
    pub fn label(&self) -> &str {
        self.registration_no
            .as_deref()
            .unwrap_or_else(|| self.imei.as_str())
    }
}

/// Record-store operations consumed by the pipeline.
///
/// Every method is fallible; callers in the hot path log persistence
/// failures and keep going (degraded operation), they never crash.
#[async_trait]
pub trait TelemetryStore: Send + Sync + std::fmt::Debug {
    /// Resolves a device IMEI to its vehicle row.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn find_vehicle_by_imei(
        &self,
        imei: &Imei,
    ) -> Result<Option<VehicleRecord>, PipelineError>;

    /// Lists all registered vehicles.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, PipelineError>;

    /// Appends a telemetry sample record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn insert_sample(
        &self,
        vehicle_id: VehicleId,
        sample: &TelemetrySample,
    ) -> Result<(), PipelineError>;

    /// Updates the vehicle's last-known position/speed/ignition/state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn update_vehicle_position(
        &self,
        vehicle_id: VehicleId,
        sample: &TelemetrySample,
        state: VehicleState,
    ) -> Result<(), PipelineError>;

    /// Increments the vehicle's accumulated GPS odometer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn add_gps_distance(&self, vehicle_id: VehicleId, km: f64) -> Result<(), PipelineError>;

    /// Sets the vehicle's last reported dash odometer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn set_dash_odometer(&self, vehicle_id: VehicleId, km: f64)
        -> Result<(), PipelineError>;

    /// Appends a fuel event record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn insert_fuel_event(&self, event: &FuelEvent) -> Result<(), PipelineError>;

    /// Appends an alert record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn insert_alert(&self, alert: &Alert) -> Result<(), PipelineError>;

    /// Marks an alert resolved.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn resolve_alert(
        &self,
        alert_id: AlertId,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    /// Appends a geofence transition record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn insert_geofence_event(&self, event: &GeofenceEvent) -> Result<(), PipelineError>;

    /// Lists geofences, optionally only active ones.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn list_geofences(&self, active_only: bool) -> Result<Vec<Geofence>, PipelineError>;

    /// Creates a trip record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn create_trip(&self, trip: &Trip) -> Result<(), PipelineError>;

    /// Updates the cumulative counters of an active trip.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TripNotFound`] when no active trip with
    /// the given id exists (callers drop their registry entry), and
    /// [`PipelineError::Persistence`] on store failure.
    async fn update_trip_progress(
        &self,
        trip_id: TripId,
        distance_km: f64,
        fuel_consumed: f64,
    ) -> Result<(), PipelineError>;

    /// Finalizes a completed trip record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TripNotFound`] when the trip row is gone,
    /// and [`PipelineError::Persistence`] on store failure.
    async fn complete_trip(&self, trip: &Trip) -> Result<(), PipelineError>;

    /// Lists trips still marked active (registry reconciliation at startup).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] on store failure.
    async fn list_active_trips(&self) -> Result<Vec<Trip>, PipelineError>;
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_status_round_trip() {
        assert_eq!(
            VehicleStatus::from_str_lossy(VehicleStatus::Active.as_str()),
            VehicleStatus::Active
        );
        assert_eq!(
            VehicleStatus::from_str_lossy("something-else"),
            VehicleStatus::Inactive
        );
    }

    #[test]
    fn label_prefers_registration_number() {
        let Ok(imei) = Imei::parse("356938035643809") else {
            panic!("valid imei");
        };
        let mut record = VehicleRecord {
            id: VehicleId::new(),
            imei,
            registration_no: Some("DL-01-AB-1234".to_string()),
            status: VehicleStatus::Active,
        };
        assert_eq!(record.label(), "DL-01-AB-1234");
        record.registration_no = None;
        assert_eq!(record.label(), "356938035643809");
    }
}
