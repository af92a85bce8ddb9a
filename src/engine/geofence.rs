//! Geofence evaluator.
//!
//! Tests every active geofence against each vehicle position and emits
//! ENTRY/EXIT events on containment edges plus a single DWELL event per
//! continuous stay past the dwell threshold. Containment state is held in
//! memory per (vehicle, geofence) pair; it is lost on restart and
//! re-derived from the next sample, at the cost of missing the edge
//! exactly at restart time.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::Thresholds;
use crate::domain::{
    Alert, AlertKind, AlertSeverity, EventBus, Geofence, GeofenceEvent, GeofenceId,
    GeofenceTransition, TelemetryEvent, TelemetrySample, VehicleId,
};
use crate::error::PipelineError;
use crate::persistence::TelemetryStore;

/// Remembered containment for one (vehicle, geofence) pair.
#[derive(Debug, Clone, Copy)]
struct Containment {
    inside: bool,
    inside_since: DateTime<Utc>,
    dwell_emitted: bool,
}

/// Geofence evaluator service.
///
/// Reads the active geofence list through the store on every evaluation
/// so external edits (including deactivation mid-session) take effect on
/// the next sample without touching history.
#[derive(Debug)]
pub struct GeofenceEvaluator {
    store: Arc<dyn TelemetryStore>,
    bus: EventBus,
    thresholds: Thresholds,
    containment: Mutex<HashMap<(VehicleId, GeofenceId), Containment>>,
}

impl GeofenceEvaluator {
    /// Creates the evaluator with its collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>, bus: EventBus, thresholds: Thresholds) -> Self {
        Self {
            store,
            bus,
            thresholds,
            containment: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluates all active geofences against one sample.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] when the geofence list
    /// cannot be read or an event write fails; the caller logs and
    /// continues.
    pub async fn process(
        &self,
        vehicle_id: VehicleId,
        sample: &TelemetrySample,
    ) -> Result<(), PipelineError> {
        let fences = self.store.list_geofences(true).await?;
        let position = sample.position();

        for fence in &fences {
            let inside = fence.contains(position);
            let transition = self
                .advance_state(vehicle_id, fence, inside, sample.timestamp)
                .await;
            if let Some(transition) = transition {
                self.emit(vehicle_id, fence, transition, sample).await?;
            }
        }
        Ok(())
    }

    /// Updates remembered containment and returns the transition to emit,
    /// if any. The first observation for a pair only records state.
    async fn advance_state(
        &self,
        vehicle_id: VehicleId,
        fence: &Geofence,
        inside: bool,
        at: DateTime<Utc>,
    ) -> Option<GeofenceTransition> {
        let mut map = self.containment.lock().await;
        let key = (vehicle_id, fence.id);

        if !map.contains_key(&key) {
            map.insert(
                key,
                Containment {
                    inside,
                    inside_since: at,
                    dwell_emitted: false,
                },
            );
            return None;
        }
        let Some(state) = map.get_mut(&key) else {
            return None;
        };

        if inside != state.inside {
            state.inside = inside;
            state.inside_since = at;
            state.dwell_emitted = false;
            return Some(if inside {
                GeofenceTransition::Entry
            } else {
                GeofenceTransition::Exit
            });
        }

        if inside && !state.dwell_emitted {
            let dwell_min = (at - state.inside_since).num_seconds() as f64 / 60.0;
            if dwell_min > self.thresholds.geofence_dwell_min {
                state.dwell_emitted = true;
                return Some(GeofenceTransition::Dwell);
            }
        }
        None
    }

    async fn emit(
        &self,
        vehicle_id: VehicleId,
        fence: &Geofence,
        transition: GeofenceTransition,
        sample: &TelemetrySample,
    ) -> Result<(), PipelineError> {
        let event = GeofenceEvent {
            vehicle_id,
            geofence_id: fence.id,
            transition,
            position: sample.position(),
            timestamp: sample.timestamp,
        };
        self.store.insert_geofence_event(&event).await?;
        let _ = self.bus.publish(TelemetryEvent::GeofenceTransition {
            event: event.clone(),
        });

        let kind = match transition {
            GeofenceTransition::Entry => AlertKind::GeofenceEntry,
            GeofenceTransition::Exit => AlertKind::GeofenceExit,
            GeofenceTransition::Dwell => AlertKind::GeofenceDwell,
        };
        let alert = Alert::new(
            kind,
            AlertSeverity::Warning,
            Some(vehicle_id),
            format!("vehicle {} zone \"{}\"", transition_verb(transition), fence.name),
            serde_json::json!({
                "geofence_id": fence.id,
                "transition": transition.as_str(),
            }),
        );
        self.store.insert_alert(&alert).await?;
        let _ = self.bus.publish(TelemetryEvent::AlertRaised { alert });
        tracing::info!(
            %vehicle_id,
            geofence = %fence.name,
            transition = transition.as_str(),
            "geofence transition"
        );
        Ok(())
    }
}

const fn transition_verb(transition: GeofenceTransition) -> &'static str {
    match transition {
        GeofenceTransition::Entry => "entered",
        GeofenceTransition::Exit => "left",
        GeofenceTransition::Dwell => "dwelling in",
    }
}
