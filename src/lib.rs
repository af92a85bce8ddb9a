//! # fleetwatch
//!
//! Telemetry processing pipeline for vehicle-tracking fleets. Ingests
//! periodic location/sensor reports from tracking devices and turns each
//! sample into operational intelligence: motion classification,
//! fuel-theft and odometer-tamper detection, geofence containment
//! transitions, and trip lifecycle tracking.
//!
//! HTTP routing, authentication, dashboards, and reporting UIs are
//! external collaborators; this crate is the analysis core plus the
//! polling harness that feeds it.
//!
//! ## Architecture
//!
//! ```text
//! GpsProvider (militrack | simulator)
//!     │
//!     ├── PollerHarness (poller)          pushed samples
//!     │                                        │
//!     └──────────────► Pipeline (pipeline) ◄───┘
//!                          │  normalize → classify → per-vehicle worker
//!                          │
//!                          ├── FuelEngine ────────┐
//!                          ├── OdometerDetector   │  (engine/)
//!                          ├── GeofenceEvaluator  │
//!                          ├── TripTracker ───────┘
//!                          │
//!                          ├── VehicleRegistry (domain/)
//!                          ├── EventBus (domain/)
//!                          └── TelemetryStore (persistence/)
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod persistence;
pub mod pipeline;
pub mod poller;
pub mod provider;
