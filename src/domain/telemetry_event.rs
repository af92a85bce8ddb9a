//! Domain events published through the [`super::EventBus`].
//!
//! Every processed sample and every engine finding emits a
//! [`TelemetryEvent`]. Connected dashboards subscribe to the bus; the
//! transport is an external collaborator, so delivery is fire-and-forget.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::alert::Alert;
use super::fuel::FuelEvent;
use super::geofence::GeofenceEvent;
use super::ids::{Imei, VehicleId};
use super::sample::VehicleState;
use super::trip::Trip;

/// Event broadcast after pipeline activity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Emitted for every processed sample: the vehicle's fresh position.
    PositionUpdated {
        /// Vehicle identifier.
        vehicle_id: VehicleId,
        /// Device IMEI.
        imei: Imei,
        /// Latitude in decimal degrees.
        latitude: f64,
        /// Longitude in decimal degrees.
        longitude: f64,
        /// Speed in km/h.
        speed: f64,
        /// Ignition state.
        ignition: bool,
        /// Classified motion state.
        state: VehicleState,
        /// Sample time.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when any engine raises an alert.
    AlertRaised {
        /// The alert as created.
        alert: Alert,
    },

    /// Emitted for every non-normal fuel analysis.
    FuelAnomaly {
        /// The fuel event record.
        event: FuelEvent,
    },

    /// Emitted on geofence entry/exit/dwell.
    GeofenceTransition {
        /// The transition record.
        event: GeofenceEvent,
    },

    /// Emitted when a trip starts.
    TripStarted {
        /// The freshly opened trip.
        trip: Trip,
    },

    /// Emitted when a trip completes.
    TripCompleted {
        /// The finalized trip.
        trip: Trip,
    },
}

impl TelemetryEvent {
    /// Broadcast topic for the event, used by the push transport.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::PositionUpdated { .. } => "vehicle:update",
            Self::AlertRaised { .. } => "alert:new",
            Self::FuelAnomaly { .. } => "fuel:event",
            Self::GeofenceTransition { .. } => "geofence:event",
            Self::TripStarted { .. } | Self::TripCompleted { .. } => "trip:update",
        }
    }

    /// Vehicle the event concerns, when vehicle-scoped.
    #[must_use]
    pub fn vehicle_id(&self) -> Option<VehicleId> {
        match self {
            Self::PositionUpdated { vehicle_id, .. } => Some(*vehicle_id),
            Self::AlertRaised { alert } => alert.vehicle_id,
            Self::FuelAnomaly { event } => Some(event.vehicle_id),
            Self::GeofenceTransition { event } => Some(event.vehicle_id),
            Self::TripStarted { trip } | Self::TripCompleted { trip } => Some(trip.vehicle_id),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::alert::{AlertKind, AlertSeverity};

    #[test]
    fn topics_are_stable() {
        let alert = Alert::new(
            AlertKind::FuelTheft,
            AlertSeverity::Critical,
            Some(VehicleId::new()),
            "msg",
            serde_json::Value::Null,
        );
        let event = TelemetryEvent::AlertRaised { alert };
        assert_eq!(event.topic(), "alert:new");
    }

    #[test]
    fn position_update_serializes_with_discriminator() {
        let Ok(imei) = Imei::parse("356938035643809") else {
            panic!("valid imei");
        };
        let event = TelemetryEvent::PositionUpdated {
            vehicle_id: VehicleId::new(),
            imei,
            latitude: 28.6,
            longitude: 77.2,
            speed: 42.0,
            ignition: true,
            state: VehicleState::Moving,
            timestamp: Utc::now(),
        };
        let Ok(json) = serde_json::to_string(&event) else {
            panic!("serialize");
        };
        assert!(json.contains("\"event_type\":\"position_updated\""));
        assert!(json.contains("\"state\":\"moving\""));
    }

    #[test]
    fn vehicle_id_accessor_covers_all_variants() {
        let id = VehicleId::new();
        let alert = Alert::new(
            AlertKind::GeofenceExit,
            AlertSeverity::Warning,
            Some(id),
            "left zone",
            serde_json::Value::Null,
        );
        let event = TelemetryEvent::AlertRaised { alert };
        assert_eq!(event.vehicle_id(), Some(id));
    }
}
