//! Per-vehicle runtime state with fine-grained locking.
//!
//! [`VehicleRegistry`] stores the mutable processing state of every known
//! vehicle in a `HashMap` where each entry is individually protected by a
//! [`tokio::sync::RwLock`]. Entries are created lazily on a vehicle's
//! first sample. The registry is owned exclusively by the pipeline;
//! engines receive copies of the previous sample, never the lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::ids::VehicleId;
use super::sample::{TelemetrySample, VehicleState};

/// Mutable per-vehicle processing state.
///
/// The GPS odometer is a monotonic non-decreasing accumulator; the dash
/// odometer mirrors the last device-reported value. The persisted
/// snapshot is the source of truth across restarts; increments are
/// in-process until flushed by the worker.
#[derive(Debug, Clone, Default)]
pub struct VehicleRuntimeState {
    /// Last processed sample, if any.
    pub last_sample: Option<TelemetrySample>,
    /// Accumulated GPS-derived odometer in kilometers.
    pub gps_odometer_km: f64,
    /// Last reported dash odometer in kilometers.
    pub dash_odometer_km: Option<f64>,
    /// Last classified motion state.
    pub last_state: Option<VehicleState>,
}

impl VehicleRuntimeState {
    /// Timestamp of the last processed sample.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_sample.as_ref().map(|s| s.timestamp)
    }

    /// Adds GPS distance to the accumulator. Negative or non-finite
    /// increments are ignored so the accumulator never decreases.
    pub fn accumulate_distance(&mut self, km: f64) {
        if km.is_finite() && km > 0.0 {
            self.gps_odometer_km += km;
        }
    }
}

/// Registry of runtime state for all vehicles seen by the pipeline.
///
/// # Concurrency
///
/// - Entries for different vehicles are mutated concurrently.
/// - The per-vehicle worker is the only writer of an entry, so writes to
///   the same vehicle are already serialized upstream; the per-entry lock
///   keeps reads (snapshots, status queries) safe alongside.
#[derive(Debug, Default)]
pub struct VehicleRegistry {
    vehicles: RwLock<HashMap<VehicleId, Arc<RwLock<VehicleRuntimeState>>>>,
}

impl VehicleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vehicles: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the state entry for a vehicle, creating a default entry on
    /// first access.
    pub async fn entry(&self, vehicle_id: VehicleId) -> Arc<RwLock<VehicleRuntimeState>> {
        {
            let map = self.vehicles.read().await;
            if let Some(entry) = map.get(&vehicle_id) {
                return Arc::clone(entry);
            }
        }
        let mut map = self.vehicles.write().await;
        Arc::clone(
            map.entry(vehicle_id)
                .or_insert_with(|| Arc::new(RwLock::new(VehicleRuntimeState::default()))),
        )
    }

    /// Seeds a vehicle's state from a persisted snapshot, replacing any
    /// in-memory entry.
    pub async fn restore(&self, vehicle_id: VehicleId, state: VehicleRuntimeState) {
        let mut map = self.vehicles.write().await;
        map.insert(vehicle_id, Arc::new(RwLock::new(state)));
    }

    /// Number of vehicles with runtime state.
    pub async fn len(&self) -> usize {
        self.vehicles.read().await.len()
    }

    /// Returns `true` when no vehicle has runtime state yet.
    pub async fn is_empty(&self) -> bool {
        self.vehicles.read().await.is_empty()
    }
}
