//! Fuel anomaly vocabulary and the immutable [`FuelEvent`] record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::VehicleId;

/// Classification of one fuel-level delta between consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuelEventType {
    /// Large drop while the engine is off inside a short window.
    Theft,
    /// Fuel gained, consistent with a stationary refill.
    Refill,
    /// Smaller loss while the engine is off.
    Loss,
    /// Delta consistent with distance-based consumption; no alert.
    Normal,
    /// Delta inconsistent with motion/ignition state; sensor tampering or
    /// an implausible reading.
    Manipulation,
}

impl FuelEventType {
    /// Stable string form, matching the persisted event-type column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Theft => "THEFT",
            Self::Refill => "REFILL",
            Self::Loss => "LOSS",
            Self::Normal => "NORMAL",
            Self::Manipulation => "MANIPULATION",
        }
    }
}

/// Named drop/gain shape that led to the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuelPattern {
    /// Sudden drop with the ignition off.
    EngineOffDrop,
    /// Drop too fast for the distance covered with the engine on.
    RapidDrop,
    /// Fuel gained while the vehicle stood still.
    RefillNoMovement,
    /// Slow loss with the engine off.
    GradualLoss,
    /// Any other inconsistent reading.
    SuspiciousPattern,
}

impl FuelPattern {
    /// Stable string form, matching the persisted pattern column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EngineOffDrop => "ENGINE_OFF_DROP",
            Self::RapidDrop => "RAPID_DROP",
            Self::RefillNoMovement => "REFILL_NO_MOVEMENT",
            Self::GradualLoss => "GRADUAL_LOSS",
            Self::SuspiciousPattern => "SUSPICIOUS_PATTERN",
        }
    }
}

/// Traffic-light severity of a fuel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelSeverity {
    /// Informational; no alert raised.
    Green,
    /// Suspicious; alert raised at warning level.
    Yellow,
    /// Critical anomaly; alert raised at critical level.
    Red,
}

impl FuelSeverity {
    /// Stable string form, matching the persisted severity column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

/// Ignition-derived engine state at the time of the reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    /// Ignition on.
    On,
    /// Ignition off.
    Off,
}

impl EngineState {
    /// Stable string form, matching the persisted engine-state column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

/// Append-only record of one analyzed fuel delta.
///
/// Created by the fuel engine; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelEvent {
    /// Vehicle the event belongs to.
    pub vehicle_id: VehicleId,
    /// Time of the current sample that closed the delta window.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: FuelEventType,
    /// Drop/gain shape, when one matched.
    pub pattern: Option<FuelPattern>,
    /// Traffic-light severity.
    pub severity: FuelSeverity,
    /// Signed fuel delta in liters (`current - previous`).
    pub delta: f64,
    /// Deterministic confidence score, 0–100.
    pub confidence: u8,
    /// Ordered human-readable evidence lines.
    pub evidence: Vec<String>,
    /// Engine state during the window.
    pub engine_state: EngineState,
    /// Fuel level of the previous sample in liters.
    pub previous_level: f64,
    /// Fuel level of the current sample in liters.
    pub current_level: f64,
    /// GPS-derived distance covered during the window in kilometers.
    pub distance_km: f64,
}
