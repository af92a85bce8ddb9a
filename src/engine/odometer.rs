//! Odometer tamper detector.
//!
//! Compares the GPS-implied distance between two observations against the
//! device-reported odometer delta. A tamper alert requires the deviation
//! to strictly exceed both a relative threshold and an absolute floor so
//! that GPS jitter on short hops never trips it. A negative reported
//! delta is a rollback: reported as a data anomaly, never subtracted.

use std::sync::Arc;

use crate::config::Thresholds;
use crate::domain::geo::haversine_km;
use crate::domain::{
    Alert, AlertKind, AlertSeverity, EventBus, TelemetryEvent, TelemetrySample, VehicleId,
};
use crate::error::PipelineError;
use crate::persistence::TelemetryStore;

/// Outcome of comparing two odometer observations.
#[derive(Debug, Clone, PartialEq)]
pub enum OdometerFinding {
    /// Reported delta deviates from GPS-implied distance beyond both
    /// thresholds.
    Deviation {
        /// GPS-implied distance in kilometers.
        gps_km: f64,
        /// Device-reported odometer delta in kilometers.
        reported_km: f64,
        /// Absolute deviation in kilometers.
        deviation_km: f64,
        /// Deviation as a percentage of the GPS-implied distance.
        deviation_pct: f64,
    },
    /// Reported odometer went backwards.
    Rollback {
        /// Negative reported delta in kilometers.
        reported_delta_km: f64,
    },
}

/// Compares consecutive (position, odometer) observations.
///
/// Returns `None` when the readings agree within thresholds, or when the
/// odometer is missing on either sample.
#[must_use]
pub fn detect(
    previous: &TelemetrySample,
    current: &TelemetrySample,
    thresholds: &Thresholds,
) -> Option<OdometerFinding> {
    let prev_odo = previous.odometer?;
    let curr_odo = current.odometer?;

    let reported_km = curr_odo - prev_odo;
    if reported_km < 0.0 {
        return Some(OdometerFinding::Rollback {
            reported_delta_km: reported_km,
        });
    }

    let gps_km = haversine_km(previous.position(), current.position());
    let deviation_km = (gps_km - reported_km).abs();
    let deviation_pct = if gps_km > 0.0 {
        deviation_km / gps_km * 100.0
    } else if deviation_km > 0.0 {
        100.0
    } else {
        0.0
    };

    // Both conditions strictly exceeded: a deviation sitting exactly on
    // either threshold does not alert.
    if deviation_km > thresholds.odometer_deviation_abs_km
        && deviation_pct > thresholds.odometer_deviation_pct
    {
        return Some(OdometerFinding::Deviation {
            gps_km,
            reported_km,
            deviation_km,
            deviation_pct,
        });
    }
    None
}

/// Odometer detector service: detection plus persistence and broadcast.
#[derive(Debug)]
pub struct OdometerDetector {
    store: Arc<dyn TelemetryStore>,
    bus: EventBus,
    thresholds: Thresholds,
}

impl OdometerDetector {
    /// Creates the detector with its collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>, bus: EventBus, thresholds: Thresholds) -> Self {
        Self {
            store,
            bus,
            thresholds,
        }
    }

    /// Compares one sample pair and raises a tamper alert on a finding.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] when the store rejects the
    /// alert write; the caller logs and continues.
    pub async fn process(
        &self,
        vehicle_id: VehicleId,
        current: &TelemetrySample,
        previous: Option<&TelemetrySample>,
    ) -> Result<(), PipelineError> {
        let Some(previous) = previous else {
            return Ok(());
        };
        let Some(finding) = detect(previous, current, &self.thresholds) else {
            return Ok(());
        };

        let alert = match &finding {
            OdometerFinding::Deviation {
                gps_km,
                reported_km,
                deviation_km,
                deviation_pct,
            } => Alert::new(
                AlertKind::OdometerTamper,
                AlertSeverity::Critical,
                Some(vehicle_id),
                format!(
                    "odometer deviates from GPS by {deviation_km:.1} km ({deviation_pct:.1}%)"
                ),
                serde_json::json!({
                    "gps_km": gps_km,
                    "reported_km": reported_km,
                    "deviation_km": deviation_km,
                    "deviation_pct": deviation_pct,
                }),
            ),
            OdometerFinding::Rollback { reported_delta_km } => Alert::new(
                AlertKind::OdometerTamper,
                AlertSeverity::Warning,
                Some(vehicle_id),
                format!("odometer rolled back by {:.1} km", reported_delta_km.abs()),
                serde_json::json!({ "reported_delta_km": reported_delta_km }),
            ),
        };

        self.store.insert_alert(&alert).await?;
        tracing::info!(%vehicle_id, ?finding, "odometer anomaly detected");
        let _ = self.bus.publish(TelemetryEvent::AlertRaised { alert });
        Ok(())
    }
}
