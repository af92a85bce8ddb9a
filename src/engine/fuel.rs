//! Fuel anomaly engine.
//!
//! Classifies the fuel-level delta between consecutive samples against
//! the vehicle's motion and ignition state. The classification core
//! ([`analyze`]) is a pure function of its inputs so every verdict is
//! reproducible; [`FuelEngine::process`] wraps it with persistence and
//! broadcast.

use std::sync::Arc;

use crate::config::Thresholds;
use crate::domain::{
    Alert, AlertKind, AlertSeverity, EngineState, EventBus, FuelEvent, FuelEventType, FuelPattern,
    FuelSeverity, TelemetryEvent, TelemetrySample, VehicleId,
};
use crate::error::PipelineError;
use crate::persistence::TelemetryStore;

/// Outcome of analyzing one fuel delta.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelAnalysis {
    /// Event classification.
    pub event_type: FuelEventType,
    /// Matched drop/gain shape, when any.
    pub pattern: Option<FuelPattern>,
    /// Traffic-light severity.
    pub severity: FuelSeverity,
    /// Signed delta in liters (`current - previous`).
    pub delta: f64,
    /// Deterministic confidence score, 0–100.
    pub confidence: u8,
    /// Ordered evidence lines.
    pub evidence: Vec<String>,
    /// Engine state during the window.
    pub engine_state: EngineState,
    /// Previous fuel level in liters.
    pub previous_level: f64,
    /// Current fuel level in liters.
    pub current_level: f64,
    /// Distance covered during the window in kilometers.
    pub distance_km: f64,
}

/// Classifies the delta between two consecutive fuel readings.
///
/// Returns `None` when no verdict is possible: no previous sample, or a
/// missing fuel level on either side.
#[must_use]
pub fn analyze(
    current: &TelemetrySample,
    previous: Option<&TelemetrySample>,
    distance_km: f64,
    thresholds: &Thresholds,
) -> Option<FuelAnalysis> {
    let previous = previous?;
    let previous_level = previous.fuel_level?;
    let current_level = current.fuel_level?;

    let delta = current_level - previous_level;
    let magnitude = delta.abs();
    let elapsed_min = (current.timestamp - previous.timestamp).num_seconds() as f64 / 60.0;
    let engine_state = if current.ignition {
        EngineState::On
    } else {
        EngineState::Off
    };
    let stationary = distance_km <= thresholds.stationary_distance_km;
    let in_window = elapsed_min <= thresholds.fuel_drop_window_min;

    let base = |event_type, pattern, severity, confidence, evidence| FuelAnalysis {
        event_type,
        pattern,
        severity,
        delta,
        confidence,
        evidence,
        engine_state,
        previous_level,
        current_level,
        distance_km,
    };

    // Sensor noise: deltas below the floor carry no signal.
    if magnitude < thresholds.fuel_noise_floor_l {
        return Some(base(
            FuelEventType::Normal,
            None,
            FuelSeverity::Green,
            confidence(magnitude, in_window, false),
            vec![format!("delta {delta:+.1} L within sensor noise")],
        ));
    }

    if delta < 0.0 {
        if engine_state == EngineState::Off {
            if magnitude >= thresholds.critical_fuel_drop_l && in_window {
                return Some(base(
                    FuelEventType::Theft,
                    Some(FuelPattern::EngineOffDrop),
                    FuelSeverity::Red,
                    confidence(magnitude, in_window, stationary),
                    vec![
                        "engine off".to_string(),
                        format!("fuel dropped {magnitude:.1} L in {elapsed_min:.1} min"),
                        format!("distance covered {distance_km:.2} km"),
                    ],
                ));
            }
            // Smaller engine-off losses: possible slow siphoning or leak.
            let severity = if magnitude >= thresholds.min_refill_l {
                FuelSeverity::Yellow
            } else {
                FuelSeverity::Green
            };
            return Some(base(
                FuelEventType::Loss,
                Some(FuelPattern::GradualLoss),
                severity,
                confidence(magnitude, in_window, stationary),
                vec![
                    "engine off".to_string(),
                    format!("fuel dropped {magnitude:.1} L in {elapsed_min:.1} min"),
                ],
            ));
        }

        // Engine on: compare against distance-implied consumption.
        let expected_l = if thresholds.mileage_km_per_l > 0.0 {
            distance_km / thresholds.mileage_km_per_l
        } else {
            0.0
        };
        if magnitude >= thresholds.rapid_fuel_drop_l && in_window && magnitude > 2.0 * expected_l {
            let severity = if magnitude >= 2.0 * thresholds.rapid_fuel_drop_l {
                FuelSeverity::Red
            } else {
                FuelSeverity::Yellow
            };
            return Some(base(
                FuelEventType::Manipulation,
                Some(FuelPattern::RapidDrop),
                severity,
                confidence(magnitude, in_window, true),
                vec![
                    format!("fuel dropped {magnitude:.1} L in {elapsed_min:.1} min with engine on"),
                    format!(
                        "expected ~{expected_l:.1} L for {distance_km:.2} km at {:.0} km/L",
                        thresholds.mileage_km_per_l
                    ),
                ],
            ));
        }
        // Consumption consistent with the distance covered.
        return Some(base(
            FuelEventType::Normal,
            None,
            FuelSeverity::Green,
            confidence(magnitude, in_window, false),
            vec![format!(
                "consumed {magnitude:.1} L over {distance_km:.2} km"
            )],
        ));
    }

    // Fuel gained. A rise after running near-dry is a real refill, never
    // counted as theft-then-refill.
    if previous_level <= thresholds.near_empty_l {
        return Some(base(
            FuelEventType::Refill,
            if stationary {
                Some(FuelPattern::RefillNoMovement)
            } else {
                None
            },
            FuelSeverity::Green,
            confidence(magnitude, in_window, stationary),
            vec![format!(
                "refill of {magnitude:.1} L after near-empty tank ({previous_level:.1} L)"
            )],
        ));
    }

    if stationary && magnitude >= thresholds.min_refill_l {
        return Some(base(
            FuelEventType::Refill,
            Some(FuelPattern::RefillNoMovement),
            FuelSeverity::Green,
            confidence(magnitude, in_window, true),
            vec![format!(
                "refill of {magnitude:.1} L while stationary"
            )],
        ));
    }

    // Fuel rising while moving, or an implausibly small stationary gain.
    // The upstream heuristic is ambiguous here; flag rather than guess.
    Some(base(
        FuelEventType::Manipulation,
        Some(FuelPattern::SuspiciousPattern),
        FuelSeverity::Yellow,
        confidence(magnitude, in_window, false),
        vec![format!(
            "fuel rose {magnitude:.1} L over {distance_km:.2} km without a plausible refill"
        )],
    ))
}

/// Deterministic confidence score: monotonically increasing with the
/// delta magnitude, with bonuses for a tight time window and consistent
/// motion/ignition evidence.
fn confidence(magnitude: f64, in_window: bool, consistent: bool) -> u8 {
    let mut score = 40.0 + 2.0 * magnitude;
    if in_window {
        score += 10.0;
    }
    if consistent {
        score += 10.0;
    }
    score.clamp(0.0, 100.0).round() as u8
}

/// Fuel engine service: analysis plus persistence and broadcast.
#[derive(Debug)]
pub struct FuelEngine {
    store: Arc<dyn TelemetryStore>,
    bus: EventBus,
    thresholds: Thresholds,
}

impl FuelEngine {
    /// Creates the engine with its collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>, bus: EventBus, thresholds: Thresholds) -> Self {
        Self {
            store,
            bus,
            thresholds,
        }
    }

    /// Analyzes one sample pair and records the outcome.
    ///
    /// NORMAL verdicts are not persisted and raise no alert; anything
    /// else becomes an append-only [`FuelEvent`], and yellow/red
    /// severities additionally raise an [`Alert`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] when the store rejects a
    /// write; the caller logs and continues.
    pub async fn process(
        &self,
        vehicle_id: VehicleId,
        current: &TelemetrySample,
        previous: Option<&TelemetrySample>,
        distance_km: f64,
    ) -> Result<(), PipelineError> {
        let Some(analysis) = analyze(current, previous, distance_km, &self.thresholds) else {
            return Ok(());
        };
        if analysis.event_type == FuelEventType::Normal {
            return Ok(());
        }

        let event = FuelEvent {
            vehicle_id,
            timestamp: current.timestamp,
            event_type: analysis.event_type,
            pattern: analysis.pattern,
            severity: analysis.severity,
            delta: analysis.delta,
            confidence: analysis.confidence,
            evidence: analysis.evidence.clone(),
            engine_state: analysis.engine_state,
            previous_level: analysis.previous_level,
            current_level: analysis.current_level,
            distance_km: analysis.distance_km,
        };
        self.store.insert_fuel_event(&event).await?;
        let _ = self.bus.publish(TelemetryEvent::FuelAnomaly {
            event: event.clone(),
        });

        let alert_severity = match analysis.severity {
            FuelSeverity::Red => Some(AlertSeverity::Critical),
            FuelSeverity::Yellow => Some(AlertSeverity::Warning),
            FuelSeverity::Green => None,
        };
        if let Some(severity) = alert_severity {
            let kind = match analysis.event_type {
                FuelEventType::Manipulation => AlertKind::FuelManipulation,
                _ => AlertKind::FuelTheft,
            };
            let alert = Alert::new(
                kind,
                severity,
                Some(vehicle_id),
                format!(
                    "{} of {:.1} L detected (confidence {})",
                    event.event_type.as_str(),
                    event.delta.abs(),
                    event.confidence
                ),
                serde_json::json!({
                    "delta": event.delta,
                    "pattern": event.pattern.map(|p| p.as_str()),
                    "engine_state": event.engine_state.as_str(),
                    "distance_km": event.distance_km,
                }),
            );
            self.store.insert_alert(&alert).await?;
            let _ = self.bus.publish(TelemetryEvent::AlertRaised { alert });
            tracing::info!(
                %vehicle_id,
                event_type = event.event_type.as_str(),
                delta = event.delta,
                "fuel anomaly detected"
            );
        }
        Ok(())
    }
}
