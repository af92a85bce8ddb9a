//! Domain layer: core types, runtime-state registry, and event system.
//!
//! This module contains the pipeline-side domain model: typed
//! identifiers, the canonical telemetry sample, great-circle geometry,
//! geofences, fuel/alert/trip vocabulary, the runtime-state registry,
//! and the event bus that broadcasts state changes.

pub mod alert;
pub mod event_bus;
pub mod fuel;
pub mod geo;
pub mod geofence;
pub mod ids;
pub mod sample;
pub mod telemetry_event;
pub mod trip;
pub mod vehicle_registry;

pub use alert::{Alert, AlertKind, AlertSeverity};
pub use event_bus::EventBus;
pub use fuel::{EngineState, FuelEvent, FuelEventType, FuelPattern, FuelSeverity};
pub use geo::LatLng;
pub use geofence::{Geofence, GeofenceEvent, GeofenceGeometry, GeofenceTransition};
pub use ids::{AlertId, GeofenceId, Imei, TripId, VehicleId};
pub use sample::{TelemetrySample, VehicleState};
pub use telemetry_event::TelemetryEvent;
pub use trip::{Trip, TripStatus};
pub use vehicle_registry::{VehicleRegistry, VehicleRuntimeState};
