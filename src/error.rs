//! Pipeline error types.
//!
//! [`PipelineError`] is the central error type for the crate. Variants map
//! onto the processing taxonomy: validation failures (rejected before any
//! state mutation), not-found conditions (logged and short-circuited),
//! engine failures (caught at the dispatch boundary), and
//! provider/persistence failures (logged and retried on the next natural
//! interval). Nothing in this crate escalates to a panic.

/// Central error enum for the telemetry pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Incoming sample failed shape validation (malformed IMEI, coordinate
    /// out of range, negative speed, ...). Rejected before any state
    /// mutation.
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    /// No vehicle is registered for the reported IMEI.
    #[error("unknown vehicle imei: {0}")]
    VehicleNotFound(String),

    /// A trip referenced by the active-trip registry no longer exists in
    /// the store. Callers drop the registry entry, never crash.
    #[error("trip not found: {0}")]
    TripNotFound(uuid::Uuid),

    /// A geofence referenced by id was not found.
    #[error("geofence not found: {0}")]
    GeofenceNotFound(uuid::Uuid),

    /// An analysis engine failed on a sample. Caught at the worker
    /// dispatch boundary so the remaining engines still run.
    #[error("{engine} engine failed: {message}")]
    Engine {
        /// Name of the failing engine (`fuel`, `odometer`, `geofence`, `trip`).
        engine: &'static str,
        /// Human-readable failure description.
        message: String,
    },

    /// GPS provider fetch/initialize failure. The harness logs it and
    /// skips the tick.
    #[error("provider error: {0}")]
    Provider(String),

    /// Persistence collaborator failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns `true` for failures that are expected to clear on their own
    /// (provider or persistence outages). The poller and workers log these
    /// and keep going; everything else indicates a bug or bad input.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Persistence(_))
    }
}
