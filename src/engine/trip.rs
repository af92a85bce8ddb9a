//! Trip lifecycle state machine.
//!
//! Per vehicle: NONE → ACTIVE → COMPLETED, with at most one active trip
//! at any time. The active-trip registry is an in-memory map owned by
//! this component; every consumer goes through its API. On restart the
//! registry is reseeded from the store's active-trip rows; a registry
//! entry whose row has vanished is dropped with a warning, never a crash.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Thresholds;
use crate::domain::geo::haversine_km;
use crate::domain::{
    EventBus, TelemetryEvent, TelemetrySample, Trip, VehicleId, VehicleState,
};
use crate::error::PipelineError;
use crate::persistence::TelemetryStore;

/// Trip tracker service owning the active-trip registry.
#[derive(Debug)]
pub struct TripTracker {
    store: Arc<dyn TelemetryStore>,
    bus: EventBus,
    thresholds: Thresholds,
    active: Mutex<HashMap<VehicleId, Trip>>,
}

impl TripTracker {
    /// Creates the tracker with its collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>, bus: EventBus, thresholds: Thresholds) -> Self {
        Self {
            store,
            bus,
            thresholds,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Reseeds the registry from the store's active-trip rows.
    ///
    /// Called once at startup. When the store holds more than one active
    /// trip for a vehicle (should not happen), the newest wins and the
    /// rest are ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] when the rows cannot be read.
    pub async fn restore(&self) -> Result<usize, PipelineError> {
        let trips = self.store.list_active_trips().await?;
        let mut map = self.active.lock().await;
        map.clear();
        for trip in trips {
            let newer = map
                .get(&trip.vehicle_id)
                .is_none_or(|existing| existing.start_time < trip.start_time);
            if newer {
                map.insert(trip.vehicle_id, trip);
            } else {
                tracing::warn!(
                    vehicle_id = %trip.vehicle_id,
                    trip_id = %trip.id,
                    "ignoring duplicate active trip for vehicle"
                );
            }
        }
        Ok(map.len())
    }

    /// Returns a copy of the active trip for a vehicle, if any.
    pub async fn active_trip(&self, vehicle_id: VehicleId) -> Option<Trip> {
        self.active.lock().await.get(&vehicle_id).cloned()
    }

    /// Advances the state machine with one classified sample.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] when a trip write fails;
    /// the caller logs and continues.
    pub async fn process(
        &self,
        vehicle_id: VehicleId,
        current: &TelemetrySample,
        previous: Option<&TelemetrySample>,
        state: VehicleState,
    ) -> Result<(), PipelineError> {
        let moving = state == VehicleState::Moving;
        let mut map = self.active.lock().await;

        if !map.contains_key(&vehicle_id) {
            // NONE → ACTIVE: ignition on, moving, no open trip.
            if current.ignition && moving {
                let trip = Trip::start(vehicle_id, current);
                self.store.create_trip(&trip).await?;
                tracing::info!(%vehicle_id, trip_id = %trip.id, "trip started");
                let _ = self.bus.publish(TelemetryEvent::TripStarted {
                    trip: trip.clone(),
                });
                map.insert(vehicle_id, trip);
            }
            return Ok(());
        }

        // ACTIVE update: accumulate the segment since the previous sample.
        if let Some(previous) = previous {
            let (trip_id, distance_km, fuel_consumed) = {
                let Some(trip) = map.get_mut(&vehicle_id) else {
                    return Ok(());
                };
                trip.distance_km += haversine_km(previous.position(), current.position());
                if let (Some(prev_fuel), Some(curr_fuel)) =
                    (previous.fuel_level, current.fuel_level)
                {
                    let consumed = prev_fuel - curr_fuel;
                    if consumed > 0.0 {
                        trip.fuel_consumed += consumed;
                    }
                }
                (trip.id, trip.distance_km, trip.fuel_consumed)
            };
            if let Err(err) = self
                .store
                .update_trip_progress(trip_id, distance_km, fuel_consumed)
                .await
            {
                if matches!(err, PipelineError::TripNotFound(_)) {
                    tracing::warn!(
                        %vehicle_id,
                        %trip_id,
                        "active trip vanished from store, dropping registry entry"
                    );
                    map.remove(&vehicle_id);
                    return Ok(());
                }
                return Err(err);
            }
        }

        // ACTIVE → COMPLETED: sustained ignition-off, or a long stop.
        let should_complete = map.get(&vehicle_id).is_some_and(|trip| {
            let minutes = trip.minutes_since_start(current.timestamp);
            (!current.ignition && minutes > self.thresholds.ignition_off_end_min)
                || (!moving && minutes > self.thresholds.long_stop_min)
        });
        if should_complete {
            let Some(trip) = map.get(&vehicle_id) else {
                return Ok(());
            };
            let mut completed = trip.clone();
            completed.complete(current);
            // Store first: on failure the registry entry stays and the
            // completion is retried on the next sample.
            self.store.complete_trip(&completed).await?;
            map.remove(&vehicle_id);
            tracing::info!(
                %vehicle_id,
                trip_id = %completed.id,
                distance_km = completed.distance_km,
                fuel_consumed = completed.fuel_consumed,
                "trip completed"
            );
            let _ = self
                .bus
                .publish(TelemetryEvent::TripCompleted { trip: completed });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::domain::{Imei, TripStatus};
    use crate::persistence::MemoryStore;

    fn sample(
        minutes: i64,
        lat: f64,
        speed: f64,
        ignition: bool,
        fuel: Option<f64>,
    ) -> TelemetrySample {
        let Ok(imei) = Imei::parse("356938035643809") else {
            panic!("valid imei");
        };
        let Some(offset) = TimeDelta::try_minutes(minutes) else {
            panic!("valid offset");
        };
        TelemetrySample {
            imei,
            timestamp: Utc::now() + offset,
            latitude: lat,
            longitude: 77.2090,
            speed,
            ignition,
            motion: None,
            fuel_level: fuel,
            odometer: Some(1000.0),
            raw: None,
        }
    }

    fn tracker(store: &Arc<MemoryStore>) -> TripTracker {
        TripTracker::new(
            Arc::clone(store) as Arc<dyn TelemetryStore>,
            EventBus::new(16),
            Thresholds::default(),
        )
    }

    async fn drive(
        tracker: &TripTracker,
        vehicle: VehicleId,
        prev: Option<&TelemetrySample>,
        curr: &TelemetrySample,
        state: VehicleState,
    ) {
        let result = tracker.process(vehicle, curr, prev, state).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn starts_trip_on_ignition_and_motion() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let start = sample(0, 28.60, 40.0, true, Some(60.0));
        drive(&tracker, vehicle, None, &start, VehicleState::Moving).await;

        let Some(trip) = tracker.active_trip(vehicle).await else {
            panic!("trip should be active");
        };
        assert_eq!(trip.status, TripStatus::Active);
        assert_eq!(trip.start_fuel, Some(60.0));
        assert_eq!(store.trips().await.len(), 1);
    }

    #[tokio::test]
    async fn no_trip_without_ignition_or_motion() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        // Moving but ignition off (towed?), then ignition on but parked.
        let towed = sample(0, 28.60, 30.0, false, None);
        drive(&tracker, vehicle, None, &towed, VehicleState::Moving).await;
        let parked = sample(1, 28.60, 0.0, true, None);
        drive(&tracker, vehicle, None, &parked, VehicleState::Idle).await;

        assert!(tracker.active_trip(vehicle).await.is_none());
        assert!(store.trips().await.is_empty());
    }

    #[tokio::test]
    async fn only_one_active_trip_per_vehicle() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let s0 = sample(0, 28.60, 40.0, true, Some(60.0));
        drive(&tracker, vehicle, None, &s0, VehicleState::Moving).await;
        // Still moving: must update the existing trip, not open a second.
        let s1 = sample(2, 28.62, 45.0, true, Some(59.5));
        drive(&tracker, vehicle, Some(&s0), &s1, VehicleState::Moving).await;

        assert_eq!(store.trips().await.len(), 1);
    }

    #[tokio::test]
    async fn accumulates_distance_and_fuel() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let s0 = sample(0, 28.60, 40.0, true, Some(60.0));
        let s1 = sample(2, 28.62, 45.0, true, Some(59.0));
        let s2 = sample(4, 28.64, 45.0, true, Some(58.2));
        drive(&tracker, vehicle, None, &s0, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s0), &s1, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s1), &s2, VehicleState::Moving).await;

        let Some(trip) = tracker.active_trip(vehicle).await else {
            panic!("trip active");
        };
        // Two segments of 0.02° latitude each, ~2.22 km apiece.
        assert!((trip.distance_km - 4.45).abs() < 0.1, "got {}", trip.distance_km);
        assert!((trip.fuel_consumed - 1.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn refill_mid_trip_does_not_reduce_consumed() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let s0 = sample(0, 28.60, 40.0, true, Some(20.0));
        let s1 = sample(2, 28.62, 45.0, true, Some(19.0));
        let s2 = sample(4, 28.64, 45.0, true, Some(55.0)); // refill
        drive(&tracker, vehicle, None, &s0, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s0), &s1, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s1), &s2, VehicleState::Moving).await;

        let Some(trip) = tracker.active_trip(vehicle).await else {
            panic!("trip active");
        };
        assert!((trip.fuel_consumed - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn completes_after_sustained_ignition_off() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let s0 = sample(0, 28.60, 40.0, true, Some(60.0));
        let s1 = sample(3, 28.63, 45.0, true, Some(58.0));
        // Ignition off 6 minutes after start: past the 5-minute hold.
        let s2 = sample(6, 28.64, 0.0, false, Some(57.5));
        drive(&tracker, vehicle, None, &s0, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s0), &s1, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s1), &s2, VehicleState::Stopped).await;

        assert!(tracker.active_trip(vehicle).await.is_none());
        let trips = store.trips().await;
        assert_eq!(trips.len(), 1);
        let Some(trip) = trips.first() else {
            panic!("one trip");
        };
        assert_eq!(trip.status, TripStatus::Completed);
        assert!(trip.end_time.is_some());
        assert!(trip.distance_km > 0.0);
        // Start/end level delta (60.0 - 57.5) wins over the accumulator.
        assert!((trip.fuel_consumed - 2.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn brief_ignition_off_does_not_complete() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let s0 = sample(0, 28.60, 40.0, true, Some(60.0));
        // Ignition blip 2 minutes in: under the 5-minute hold.
        let s1 = sample(2, 28.61, 0.0, false, Some(59.8));
        drive(&tracker, vehicle, None, &s0, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s0), &s1, VehicleState::Stopped).await;

        assert!(tracker.active_trip(vehicle).await.is_some());
    }

    #[tokio::test]
    async fn completes_after_long_stop_with_ignition_on() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let s0 = sample(0, 28.60, 40.0, true, Some(60.0));
        let s1 = sample(16, 28.61, 0.0, true, Some(59.0));
        drive(&tracker, vehicle, None, &s0, VehicleState::Moving).await;
        drive(&tracker, vehicle, Some(&s0), &s1, VehicleState::Idle).await;

        assert!(tracker.active_trip(vehicle).await.is_none());
        let trips = store.trips().await;
        let Some(trip) = trips.first() else {
            panic!("one trip");
        };
        assert_eq!(trip.status, TripStatus::Completed);
    }

    #[tokio::test]
    async fn vanished_store_row_drops_registry_entry() {
        let store = Arc::new(MemoryStore::new());
        let tracker = tracker(&store);
        let vehicle = VehicleId::new();

        let s0 = sample(0, 28.60, 40.0, true, Some(60.0));
        drive(&tracker, vehicle, None, &s0, VehicleState::Moving).await;
        let Some(trip) = tracker.active_trip(vehicle).await else {
            panic!("trip active");
        };
        store.delete_trip(trip.id).await;

        let s1 = sample(2, 28.62, 45.0, true, Some(59.5));
        drive(&tracker, vehicle, Some(&s0), &s1, VehicleState::Moving).await;
        assert!(tracker.active_trip(vehicle).await.is_none());
    }

    #[tokio::test]
    async fn restore_reseeds_registry_from_store() {
        let store = Arc::new(MemoryStore::new());
        {
            let seeder = tracker(&store);
            let s0 = sample(0, 28.60, 40.0, true, Some(60.0));
            let vehicle = VehicleId::new();
            let result = seeder.process(vehicle, &s0, None, VehicleState::Moving).await;
            assert!(result.is_ok());
        }

        // Fresh tracker, as after a process restart.
        let tracker = tracker(&store);
        let Ok(restored) = tracker.restore().await else {
            panic!("restore");
        };
        assert_eq!(restored, 1);
    }
}
