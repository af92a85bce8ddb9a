//! Analysis engines: the four independent sample analyzers.
//!
//! Each engine is an explicit service object constructed once at startup
//! and handed to the pipeline; there is no module-level mutable state.
//! Engines are order-independent and isolated: a failure in one is
//! caught at the dispatch boundary and never stops the others.

pub mod fuel;
pub mod geofence;
pub mod odometer;
pub mod trip;

pub use fuel::{FuelAnalysis, FuelEngine};
pub use geofence::GeofenceEvaluator;
pub use odometer::{OdometerDetector, OdometerFinding};
pub use trip::TripTracker;
