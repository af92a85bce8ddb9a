//! Sample normalization and motion classification.
//!
//! Two inputs converge here: strict push-ingestion payloads
//! ([`IngestPayload`]) and lenient provider wire payloads
//! ([`RawSample`], built by [`from_wire`]). Both become a canonical
//! [`TelemetrySample`] via [`canonicalize`], which rejects out-of-range
//! values before any state is touched. Unparsable numeric/boolean wire
//! fields become `None`, never an error.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::config::Thresholds;
use crate::domain::{Imei, TelemetrySample, VehicleState};
use crate::error::PipelineError;

/// Maximum plausible road speed accepted by validation, in km/h.
pub const MAX_SPEED_KMH: f64 = 300.0;

/// Strict single-sample ingestion contract.
///
/// Shape violations are rejected with [`PipelineError::InvalidSample`]
/// before processing; there are no partial writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestPayload {
    /// Device IMEI, 15 digits.
    pub imei: String,
    /// Sample time: ISO-8601 string or epoch seconds.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Latitude in decimal degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in decimal degrees, `[-180, 180]`.
    pub longitude: f64,
    /// Speed in km/h, `[0, 300]`.
    pub speed: f64,
    /// Ignition line state.
    pub ignition: bool,
    /// Device motion sensor flag.
    #[serde(default)]
    pub motion: Option<bool>,
    /// Fuel level in liters, `>= 0`.
    #[serde(default, rename = "fuelLevel")]
    pub fuel_level: Option<f64>,
    /// Dash odometer in kilometers, `>= 0`.
    #[serde(default)]
    pub odometer: Option<f64>,
    /// Device power voltage; accepted but unused by the pipeline.
    #[serde(default)]
    pub power: Option<f64>,
    /// Opaque original payload.
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

/// Lenient provider-side reading. Every field except the IMEI may be
/// missing; the normalizer decides what is required.
#[derive(Debug, Clone, Default)]
pub struct RawSample {
    /// Device IMEI as reported on the wire.
    pub imei: String,
    /// Sample time, when parsable.
    pub timestamp: Option<DateTime<Utc>>,
    /// Latitude, when parsable.
    pub latitude: Option<f64>,
    /// Longitude, when parsable.
    pub longitude: Option<f64>,
    /// Speed in km/h, when parsable.
    pub speed: Option<f64>,
    /// Ignition state, when parsable.
    pub ignition: Option<bool>,
    /// Motion flag, when parsable.
    pub motion: Option<bool>,
    /// Fuel level in liters, when parsable.
    pub fuel_level: Option<f64>,
    /// Dash odometer in kilometers, when parsable.
    pub odometer: Option<f64>,
    /// Original wire payload.
    pub raw: Option<serde_json::Value>,
}

impl From<IngestPayload> for RawSample {
    fn from(p: IngestPayload) -> Self {
        Self {
            imei: p.imei,
            timestamp: Some(p.timestamp),
            latitude: Some(p.latitude),
            longitude: Some(p.longitude),
            speed: Some(p.speed),
            ignition: Some(p.ignition),
            motion: p.motion,
            fuel_level: p.fuel_level,
            odometer: p.odometer,
            raw: p.raw,
        }
    }
}

/// Reconciles a provider wire object into a [`RawSample`].
///
/// Field-name aliases follow the device vendors: `imei`/`deviceId`,
/// `timestamp`/`gpsTime`, `latitude`/`lat`, `longitude`/`lng`,
/// `fuelLevel`/`fuel`, `odometer`/`mileage`, and ignition as a bool,
/// a 0/1 number, or the `acc` line. Returns `None` only when no device
/// identity is present at all.
#[must_use]
pub fn from_wire(value: &serde_json::Value) -> Option<RawSample> {
    let imei = string_field(value, &["imei", "deviceId"])?;

    Some(RawSample {
        imei,
        timestamp: timestamp_field(value, &["timestamp", "gpsTime"]),
        latitude: number_field(value, &["latitude", "lat"]),
        longitude: number_field(value, &["longitude", "lng"]),
        speed: number_field(value, &["speed"]),
        ignition: bool_field(value, &["ignition", "acc"]),
        motion: bool_field(value, &["motion"]),
        fuel_level: number_field(value, &["fuelLevel", "fuel"]),
        odometer: number_field(value, &["odometer", "mileage"]),
        raw: Some(value.clone()),
    })
}

/// Converts a lenient reading into the canonical immutable sample.
///
/// Required: a valid IMEI, a timestamp, and an in-range position.
/// Speed defaults to 0 and ignition to off when the device omitted them;
/// out-of-range speed, negative fuel, and negative odometer are rejected.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidSample`] describing the first failing
/// field.
pub fn canonicalize(raw: RawSample) -> Result<TelemetrySample, PipelineError> {
    let imei = Imei::parse(&raw.imei)?;

    let timestamp = raw
        .timestamp
        .ok_or_else(|| PipelineError::InvalidSample("missing timestamp".to_string()))?;

    let latitude = raw
        .latitude
        .ok_or_else(|| PipelineError::InvalidSample("missing latitude".to_string()))?;
    let longitude = raw
        .longitude
        .ok_or_else(|| PipelineError::InvalidSample("missing longitude".to_string()))?;
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(PipelineError::InvalidSample(format!(
            "latitude out of range: {latitude}"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(PipelineError::InvalidSample(format!(
            "longitude out of range: {longitude}"
        )));
    }

    let speed = raw.speed.unwrap_or(0.0);
    if !(0.0..=MAX_SPEED_KMH).contains(&speed) {
        return Err(PipelineError::InvalidSample(format!(
            "speed out of range: {speed}"
        )));
    }

    if let Some(fuel) = raw.fuel_level
        && fuel < 0.0
    {
        return Err(PipelineError::InvalidSample(format!(
            "negative fuel level: {fuel}"
        )));
    }
    if let Some(odo) = raw.odometer
        && odo < 0.0
    {
        return Err(PipelineError::InvalidSample(format!(
            "negative odometer: {odo}"
        )));
    }

    Ok(TelemetrySample {
        imei,
        timestamp,
        latitude,
        longitude,
        speed,
        ignition: raw.ignition.unwrap_or(false),
        motion: raw.motion,
        fuel_level: raw.fuel_level,
        odometer: raw.odometer,
        raw: raw.raw,
    })
}

/// Derives the motion state for one sample.
///
/// Rules, applied in order:
/// 1. speed above the moving threshold, or the motion flag set → moving
/// 2. speed between the idle and moving thresholds → idle
/// 3. ignition on while at or below the idle threshold → idle
/// 4. otherwise → stopped
#[must_use]
pub fn classify(sample: &TelemetrySample, thresholds: &Thresholds) -> VehicleState {
    if sample.speed > thresholds.moving_speed_kmh || sample.motion == Some(true) {
        return VehicleState::Moving;
    }
    if sample.speed > thresholds.idle_speed_kmh {
        return VehicleState::Idle;
    }
    if sample.ignition {
        return VehicleState::Idle;
    }
    VehicleState::Stopped
}

fn string_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        let v = value.get(k)?;
        match v {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

fn number_field(value: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        let v = value.get(k)?;
        match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    })
}

fn bool_field(value: &serde_json::Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| {
        let v = value.get(k)?;
        match v {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::Number(n) => n.as_i64().map(|i| i != 0),
            serde_json::Value::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    })
}

fn timestamp_field(value: &serde_json::Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|k| {
        let v = value.get(k)?;
        match v {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.as_i64().and_then(epoch_to_datetime),
            _ => None,
        }
    })
}

fn epoch_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    // Devices report either seconds or milliseconds since the epoch;
    // anything past the year ~5138 in seconds must be milliseconds.
    if secs > 100_000_000_000 {
        Utc.timestamp_millis_opt(secs).single()
    } else {
        Utc.timestamp_opt(secs, 0).single()
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TimestampRepr {
        Iso(DateTime<Utc>),
        Epoch(i64),
    }

    match TimestampRepr::deserialize(deserializer)? {
        TimestampRepr::Iso(dt) => Ok(dt),
        TimestampRepr::Epoch(secs) => epoch_to_datetime(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("epoch out of range: {secs}"))),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const IMEI: &str = "356938035643809";

    fn raw(speed: f64, ignition: bool, motion: Option<bool>) -> RawSample {
        RawSample {
            imei: IMEI.to_string(),
            timestamp: Some(Utc::now()),
            latitude: Some(28.6139),
            longitude: Some(77.2090),
            speed: Some(speed),
            ignition: Some(ignition),
            motion,
            ..RawSample::default()
        }
    }

    fn classified(speed: f64, ignition: bool, motion: Option<bool>) -> VehicleState {
        let Ok(sample) = canonicalize(raw(speed, ignition, motion)) else {
            panic!("valid sample");
        };
        classify(&sample, &Thresholds::default())
    }

    #[test]
    fn stopped_at_zero_speed_ignition_off() {
        assert_eq!(classified(0.0, false, None), VehicleState::Stopped);
    }

    #[test]
    fn idle_at_zero_speed_ignition_on() {
        assert_eq!(classified(0.0, true, None), VehicleState::Idle);
    }

    #[test]
    fn moving_above_threshold() {
        assert_eq!(classified(5.1, false, None), VehicleState::Moving);
    }

    #[test]
    fn threshold_speed_is_not_moving() {
        // 5 km/h exactly is crawl, not movement.
        assert_eq!(classified(5.0, false, None), VehicleState::Idle);
    }

    #[test]
    fn motion_flag_overrides_speed() {
        assert_eq!(classified(0.0, false, Some(true)), VehicleState::Moving);
    }

    #[test]
    fn crawl_between_thresholds_is_idle() {
        assert_eq!(classified(3.0, false, None), VehicleState::Idle);
    }

    #[test]
    fn canonicalize_rejects_out_of_range_position() {
        let mut bad = raw(0.0, false, None);
        bad.latitude = Some(91.0);
        assert!(canonicalize(bad).is_err());

        let mut bad = raw(0.0, false, None);
        bad.longitude = Some(-180.5);
        assert!(canonicalize(bad).is_err());
    }

    #[test]
    fn canonicalize_rejects_implausible_speed() {
        assert!(canonicalize(raw(301.0, false, None)).is_err());
        assert!(canonicalize(raw(-1.0, false, None)).is_err());
    }

    #[test]
    fn canonicalize_rejects_missing_timestamp() {
        let mut bad = raw(10.0, true, None);
        bad.timestamp = None;
        assert!(canonicalize(bad).is_err());
    }

    #[test]
    fn canonicalize_defaults_speed_and_ignition() {
        let lenient = RawSample {
            imei: IMEI.to_string(),
            timestamp: Some(Utc::now()),
            latitude: Some(10.0),
            longitude: Some(20.0),
            ..RawSample::default()
        };
        let Ok(sample) = canonicalize(lenient) else {
            panic!("valid sample");
        };
        assert_eq!(sample.speed, 0.0);
        assert!(!sample.ignition);
    }

    #[test]
    fn from_wire_reconciles_vendor_aliases() {
        let wire = serde_json::json!({
            "deviceId": IMEI,
            "gpsTime": 1_700_000_000,
            "lat": "28.6139",
            "lng": 77.2090,
            "speed": "42.5",
            "acc": 1,
            "fuel": 55.5,
            "mileage": 120340,
        });
        let Some(raw) = from_wire(&wire) else {
            panic!("imei present");
        };
        assert_eq!(raw.imei, IMEI);
        assert!(raw.timestamp.is_some());
        assert_eq!(raw.latitude, Some(28.6139));
        assert_eq!(raw.longitude, Some(77.2090));
        assert_eq!(raw.speed, Some(42.5));
        assert_eq!(raw.ignition, Some(true));
        assert_eq!(raw.fuel_level, Some(55.5));
        assert_eq!(raw.odometer, Some(120_340.0));
    }

    #[test]
    fn from_wire_unparsable_fields_become_none() {
        let wire = serde_json::json!({
            "imei": IMEI,
            "timestamp": "not-a-date",
            "latitude": "n/a",
            "speed": {},
            "ignition": "maybe",
        });
        let Some(raw) = from_wire(&wire) else {
            panic!("imei present");
        };
        assert!(raw.timestamp.is_none());
        assert!(raw.latitude.is_none());
        assert!(raw.speed.is_none());
        assert!(raw.ignition.is_none());
    }

    #[test]
    fn from_wire_without_identity_is_none() {
        let wire = serde_json::json!({ "lat": 1.0, "lng": 2.0 });
        assert!(from_wire(&wire).is_none());
    }

    #[test]
    fn ingest_payload_accepts_epoch_and_iso_timestamps() {
        let json = format!(
            r#"{{"imei":"{IMEI}","timestamp":1700000000,"latitude":28.6,"longitude":77.2,"speed":10.0,"ignition":true}}"#
        );
        let Ok(payload) = serde_json::from_str::<IngestPayload>(&json) else {
            panic!("epoch timestamp accepted");
        };
        assert_eq!(payload.timestamp.timestamp(), 1_700_000_000);

        let json = format!(
            r#"{{"imei":"{IMEI}","timestamp":"2026-01-15T08:30:00Z","latitude":28.6,"longitude":77.2,"speed":10.0,"ignition":false}}"#
        );
        assert!(serde_json::from_str::<IngestPayload>(&json).is_ok());
    }

    #[test]
    fn ingest_payload_rejects_unknown_fields() {
        let json = format!(
            r#"{{"imei":"{IMEI}","timestamp":1700000000,"latitude":0,"longitude":0,"speed":0,"ignition":false,"bogus":1}}"#
        );
        assert!(serde_json::from_str::<IngestPayload>(&json).is_err());
    }
}
