//! Operational alerts raised by the analysis engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AlertId, VehicleId};

/// Kind of alert, one per detectable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Fuel dropped sharply while the engine was off.
    FuelTheft,
    /// Fuel reading inconsistent with motion/ignition state.
    FuelManipulation,
    /// Reported odometer deviates from GPS-implied distance.
    OdometerTamper,
    /// Vehicle entered a geofence.
    GeofenceEntry,
    /// Vehicle left a geofence.
    GeofenceExit,
    /// Vehicle stayed inside a geofence past the dwell threshold.
    GeofenceDwell,
}

impl AlertKind {
    /// Stable string form, matching the persisted alert-type column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FuelTheft => "FUEL_THEFT",
            Self::FuelManipulation => "FUEL_MANIPULATION",
            Self::OdometerTamper => "ODOMETER_TAMPER",
            Self::GeofenceEntry => "GEOFENCE_ENTRY",
            Self::GeofenceExit => "GEOFENCE_EXIT",
            Self::GeofenceDwell => "GEOFENCE_DWELL",
        }
    }
}

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Needs review.
    Warning,
    /// Needs immediate attention.
    Critical,
}

impl AlertSeverity {
    /// Stable string form, matching the persisted severity column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// An operational alert.
///
/// Created by an engine; mutated only to mark it resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert identifier.
    pub id: AlertId,
    /// Affected vehicle, when the alert is vehicle-scoped.
    pub vehicle_id: Option<VehicleId>,
    /// Alert kind.
    pub kind: AlertKind,
    /// Severity level.
    pub severity: AlertSeverity,
    /// Human-readable message.
    pub message: String,
    /// Structured context (deltas, thresholds, geofence ids, ...).
    pub metadata: serde_json::Value,
    /// Whether an operator has resolved the alert.
    pub resolved: bool,
    /// Identity of the resolver, once resolved.
    pub resolved_by: Option<String>,
    /// Resolution time, once resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Creates a new unresolved alert.
    #[must_use]
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        vehicle_id: Option<VehicleId>,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: AlertId::new(),
            vehicle_id,
            kind,
            severity,
            message: message.into(),
            metadata,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    /// Marks the alert resolved. The only permitted mutation.
    pub fn resolve(&mut self, by: impl Into<String>, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_by = Some(by.into());
        self.resolved_at = Some(at);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_alert_is_unresolved() {
        let alert = Alert::new(
            AlertKind::FuelTheft,
            AlertSeverity::Critical,
            Some(VehicleId::new()),
            "fuel drop of 25 L with engine off",
            serde_json::json!({ "delta": -25.0 }),
        );
        assert!(!alert.resolved);
        assert!(alert.resolved_by.is_none());
        assert!(alert.resolved_at.is_none());
    }

    #[test]
    fn resolve_sets_resolver_identity_and_time() {
        let mut alert = Alert::new(
            AlertKind::OdometerTamper,
            AlertSeverity::Warning,
            None,
            "odometer rollback",
            serde_json::Value::Null,
        );
        let at = Utc::now();
        alert.resolve("dispatcher-7", at);
        assert!(alert.resolved);
        assert_eq!(alert.resolved_by.as_deref(), Some("dispatcher-7"));
        assert_eq!(alert.resolved_at, Some(at));
    }

    #[test]
    fn kind_strings_match_store_vocabulary() {
        assert_eq!(AlertKind::GeofenceDwell.as_str(), "GEOFENCE_DWELL");
        assert_eq!(AlertKind::FuelManipulation.as_str(), "FUEL_MANIPULATION");
    }
}
