//! Trip records and lifecycle vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::LatLng;
use super::ids::{TripId, VehicleId};
use super::sample::TelemetrySample;

/// Lifecycle status of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    /// The single in-progress trip for a vehicle.
    Active,
    /// Terminal; a new trip may start fresh.
    Completed,
}

impl TripStatus {
    /// Stable string form, matching the persisted status column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

/// One vehicle journey from ignition-on movement to a sustained stop.
///
/// Created on trip start, mutated on each update tick while active,
/// finalized exactly once on trip end. At most one `Active` trip exists
/// per vehicle at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Trip identifier.
    pub id: TripId,
    /// Vehicle making the trip.
    pub vehicle_id: VehicleId,
    /// Lifecycle status.
    pub status: TripStatus,
    /// Start time.
    pub start_time: DateTime<Utc>,
    /// End time, set on completion.
    pub end_time: Option<DateTime<Utc>>,
    /// Start position.
    pub start_position: LatLng,
    /// End position, set on completion.
    pub end_position: Option<LatLng>,
    /// Dash odometer at start, when reported.
    pub start_odometer: Option<f64>,
    /// Dash odometer at end, set on completion.
    pub end_odometer: Option<f64>,
    /// Fuel level at start in liters, when reported.
    pub start_fuel: Option<f64>,
    /// Fuel level at end in liters, set on completion.
    pub end_fuel: Option<f64>,
    /// Cumulative GPS distance in kilometers, `>= 0`.
    pub distance_km: f64,
    /// Cumulative fuel consumed in liters, `>= 0`. Refills mid-trip do
    /// not reduce this counter.
    pub fuel_consumed: f64,
}

impl Trip {
    /// Opens a new active trip from the starting sample.
    #[must_use]
    pub fn start(vehicle_id: VehicleId, sample: &TelemetrySample) -> Self {
        Self {
            id: TripId::new(),
            vehicle_id,
            status: TripStatus::Active,
            start_time: sample.timestamp,
            end_time: None,
            start_position: sample.position(),
            end_position: None,
            start_odometer: sample.odometer,
            end_odometer: None,
            start_fuel: sample.fuel_level,
            end_fuel: None,
            distance_km: 0.0,
            fuel_consumed: 0.0,
        }
    }

    /// Minutes elapsed between the trip start and `at`.
    #[must_use]
    pub fn minutes_since_start(&self, at: DateTime<Utc>) -> f64 {
        (at - self.start_time).num_seconds() as f64 / 60.0
    }

    /// Finalizes the trip from the ending sample.
    ///
    /// Total fuel consumed prefers the start/end level delta; when that is
    /// non-positive (a refill happened mid-trip) it falls back to the
    /// incrementally accumulated total.
    pub fn complete(&mut self, sample: &TelemetrySample) {
        self.status = TripStatus::Completed;
        self.end_time = Some(sample.timestamp);
        self.end_position = Some(sample.position());
        self.end_odometer = sample.odometer;
        self.end_fuel = sample.fuel_level;

        if let (Some(start), Some(end)) = (self.start_fuel, sample.fuel_level) {
            let total = start - end;
            if total > 0.0 {
                self.fuel_consumed = total;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::domain::ids::Imei;

    fn sample_at(minutes: i64, fuel: f64) -> TelemetrySample {
        let Ok(imei) = Imei::parse("356938035643809") else {
            panic!("valid imei");
        };
        let Some(offset) = TimeDelta::try_minutes(minutes) else {
            panic!("valid offset");
        };
        TelemetrySample {
            imei,
            timestamp: Utc::now() + offset,
            latitude: 28.6139,
            longitude: 77.2090,
            speed: 40.0,
            ignition: true,
            motion: None,
            fuel_level: Some(fuel),
            odometer: Some(1000.0),
            raw: None,
        }
    }

    #[test]
    fn start_records_initial_readings() {
        let trip = Trip::start(VehicleId::new(), &sample_at(0, 60.0));
        assert_eq!(trip.status, TripStatus::Active);
        assert_eq!(trip.start_fuel, Some(60.0));
        assert_eq!(trip.start_odometer, Some(1000.0));
        assert_eq!(trip.distance_km, 0.0);
        assert!(trip.end_time.is_none());
    }

    #[test]
    fn complete_uses_level_delta_when_positive() {
        let mut trip = Trip::start(VehicleId::new(), &sample_at(0, 60.0));
        trip.fuel_consumed = 3.5;
        trip.complete(&sample_at(30, 52.0));
        assert_eq!(trip.status, TripStatus::Completed);
        assert!((trip.fuel_consumed - 8.0).abs() < 1e-9);
        assert_eq!(trip.end_fuel, Some(52.0));
    }

    #[test]
    fn complete_falls_back_to_accumulated_after_refill() {
        // Refill mid-trip: end level above start level, delta negative.
        let mut trip = Trip::start(VehicleId::new(), &sample_at(0, 20.0));
        trip.fuel_consumed = 6.0;
        trip.complete(&sample_at(45, 55.0));
        assert!((trip.fuel_consumed - 6.0).abs() < 1e-9);
    }

    #[test]
    fn minutes_since_start() {
        let trip = Trip::start(VehicleId::new(), &sample_at(0, 60.0));
        let later = sample_at(6, 59.0);
        assert!(trip.minutes_since_start(later.timestamp) > 5.9);
    }
}
