//! GPS provider abstraction.
//!
//! A provider is the upstream source of raw telemetry: either a live
//! device-vendor API or the deterministic simulator. The polling harness
//! is polymorphic over this trait; the simulator is a first-class test
//! double, not a production fallback.

pub mod militrack;
pub mod simulator;

use async_trait::async_trait;

use crate::domain::Imei;
use crate::error::PipelineError;
use crate::normalize::RawSample;

pub use militrack::MilitrackProvider;
pub use simulator::SimulatorProvider;

/// Capability set every GPS source implements.
#[async_trait]
pub trait GpsProvider: Send + Sync + std::fmt::Debug {
    /// Short provider name for logs (`"militrack"`, `"simulator"`).
    fn name(&self) -> &'static str;

    /// Connects/authenticates the provider. Called once by the harness
    /// before the first poll.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Provider`] when the source is unreachable;
    /// the harness fails startup in that case.
    async fn initialize(&self) -> Result<(), PipelineError>;

    /// Fetches the latest reading for every known vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Provider`] on transport failure; the
    /// harness logs it and skips the tick.
    async fn fetch_telemetry(&self) -> Result<Vec<RawSample>, PipelineError>;

    /// Fetches the latest reading for one vehicle.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Provider`] on transport failure.
    async fn fetch_single(&self, imei: &Imei) -> Result<Option<RawSample>, PipelineError>;

    /// Releases provider resources. Called once when the harness stops.
    async fn shutdown(&self);
}
