//! In-memory implementation of the persistence collaborator.
//!
//! Used by unit tests and the simulator acceptance harness. Everything
//! lives behind one `tokio::sync::RwLock`; inspection helpers expose
//! copies of the stored records so tests can assert on what the pipeline
//! wrote.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{TelemetryStore, VehicleRecord, VehicleStatus};
use crate::domain::{
    Alert, AlertId, FuelEvent, Geofence, GeofenceEvent, GeofenceId, Imei, TelemetrySample, Trip,
    TripId, TripStatus, VehicleId, VehicleState,
};
use crate::error::PipelineError;

#[derive(Debug, Default)]
struct Inner {
    vehicles: Vec<VehicleRecord>,
    samples: Vec<(VehicleId, TelemetrySample)>,
    positions: HashMap<VehicleId, (TelemetrySample, VehicleState)>,
    gps_odometer: HashMap<VehicleId, f64>,
    dash_odometer: HashMap<VehicleId, f64>,
    fuel_events: Vec<FuelEvent>,
    alerts: Vec<Alert>,
    geofence_events: Vec<GeofenceEvent>,
    geofences: Vec<Geofence>,
    trips: HashMap<TripId, Trip>,
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a vehicle and returns its id.
    pub async fn add_vehicle(&self, imei: Imei, registration_no: Option<String>) -> VehicleId {
        let record = VehicleRecord {
            id: VehicleId::new(),
            imei,
            registration_no,
            status: VehicleStatus::Active,
        };
        let id = record.id;
        self.inner.write().await.vehicles.push(record);
        id
    }

    /// Adds a geofence to the managed list.
    pub async fn add_geofence(&self, geofence: Geofence) {
        self.inner.write().await.geofences.push(geofence);
    }

    /// Flips a geofence's active flag. No-op for unknown ids.
    pub async fn set_geofence_active(&self, id: GeofenceId, active: bool) {
        let mut inner = self.inner.write().await;
        if let Some(fence) = inner.geofences.iter_mut().find(|g| g.id == id) {
            fence.active = active;
        }
    }

    /// Number of stored telemetry samples.
    pub async fn sample_count(&self) -> usize {
        self.inner.read().await.samples.len()
    }

    /// Copies of all stored fuel events.
    pub async fn fuel_events(&self) -> Vec<FuelEvent> {
        self.inner.read().await.fuel_events.clone()
    }

    /// Copies of all stored alerts.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.inner.read().await.alerts.clone()
    }

    /// Copies of all stored geofence events.
    pub async fn geofence_events(&self) -> Vec<GeofenceEvent> {
        self.inner.read().await.geofence_events.clone()
    }

    /// Copies of all stored trips, active and completed.
    pub async fn trips(&self) -> Vec<Trip> {
        self.inner.read().await.trips.values().cloned().collect()
    }

    /// Last stored position update for a vehicle.
    pub async fn last_position(
        &self,
        vehicle_id: VehicleId,
    ) -> Option<(TelemetrySample, VehicleState)> {
        self.inner.read().await.positions.get(&vehicle_id).cloned()
    }

    /// Last stored dash odometer for a vehicle.
    pub async fn dash_odometer(&self, vehicle_id: VehicleId) -> Option<f64> {
        self.inner
            .read()
            .await
            .dash_odometer
            .get(&vehicle_id)
            .copied()
    }

    /// Accumulated GPS odometer for a vehicle, zero when never credited.
    pub async fn gps_odometer(&self, vehicle_id: VehicleId) -> f64 {
        self.inner
            .read()
            .await
            .gps_odometer
            .get(&vehicle_id)
            .copied()
            .unwrap_or(0.0)
    }

    /// Removes a trip row entirely, simulating an externally deleted record.
    pub async fn delete_trip(&self, trip_id: TripId) {
        self.inner.write().await.trips.remove(&trip_id);
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn find_vehicle_by_imei(
        &self,
        imei: &Imei,
    ) -> Result<Option<VehicleRecord>, PipelineError> {
        Ok(self
            .inner
            .read()
            .await
            .vehicles
            .iter()
            .find(|v| &v.imei == imei)
            .cloned())
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, PipelineError> {
        Ok(self.inner.read().await.vehicles.clone())
    }

    async fn insert_sample(
        &self,
        vehicle_id: VehicleId,
        sample: &TelemetrySample,
    ) -> Result<(), PipelineError> {
        self.inner
            .write()
            .await
            .samples
            .push((vehicle_id, sample.clone()));
        Ok(())
    }

    async fn update_vehicle_position(
        &self,
        vehicle_id: VehicleId,
        sample: &TelemetrySample,
        state: VehicleState,
    ) -> Result<(), PipelineError> {
        self.inner
            .write()
            .await
            .positions
            .insert(vehicle_id, (sample.clone(), state));
        Ok(())
    }

    async fn add_gps_distance(&self, vehicle_id: VehicleId, km: f64) -> Result<(), PipelineError> {
        *self
            .inner
            .write()
            .await
            .gps_odometer
            .entry(vehicle_id)
            .or_insert(0.0) += km;
        Ok(())
    }

    async fn set_dash_odometer(
        &self,
        vehicle_id: VehicleId,
        km: f64,
    ) -> Result<(), PipelineError> {
        self.inner.write().await.dash_odometer.insert(vehicle_id, km);
        Ok(())
    }

    async fn insert_fuel_event(&self, event: &FuelEvent) -> Result<(), PipelineError> {
        self.inner.write().await.fuel_events.push(event.clone());
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), PipelineError> {
        self.inner.write().await.alerts.push(alert.clone());
        Ok(())
    }

    async fn resolve_alert(
        &self,
        alert_id: AlertId,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        if let Some(alert) = inner.alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.resolve(resolved_by, at);
        }
        Ok(())
    }

    async fn insert_geofence_event(&self, event: &GeofenceEvent) -> Result<(), PipelineError> {
        self.inner.write().await.geofence_events.push(event.clone());
        Ok(())
    }

    async fn list_geofences(&self, active_only: bool) -> Result<Vec<Geofence>, PipelineError> {
        Ok(self
            .inner
            .read()
            .await
            .geofences
            .iter()
            .filter(|g| g.active || !active_only)
            .cloned()
            .collect())
    }

    async fn create_trip(&self, trip: &Trip) -> Result<(), PipelineError> {
        self.inner.write().await.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn update_trip_progress(
        &self,
        trip_id: TripId,
        distance_km: f64,
        fuel_consumed: f64,
    ) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        match inner.trips.get_mut(&trip_id) {
            Some(trip) if trip.status == TripStatus::Active => {
                trip.distance_km = distance_km;
                trip.fuel_consumed = fuel_consumed;
                Ok(())
            }
            _ => Err(PipelineError::TripNotFound(*trip_id.as_uuid())),
        }
    }

    async fn complete_trip(&self, trip: &Trip) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        match inner.trips.get_mut(&trip.id) {
            Some(stored) => {
                *stored = trip.clone();
                Ok(())
            }
            None => Err(PipelineError::TripNotFound(*trip.id.as_uuid())),
        }
    }

    async fn list_active_trips(&self) -> Result<Vec<Trip>, PipelineError> {
        Ok(self
            .inner
            .read()
            .await
            .trips
            .values()
            .filter(|t| t.status == TripStatus::Active)
            .cloned()
            .collect())
    }
}
