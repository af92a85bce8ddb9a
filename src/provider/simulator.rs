//! Deterministic GPS simulator.
//!
//! Drives five scripted behaviors per vehicle for acceptance testing:
//! normal driving, fuel theft, odometer tamper, route deviation, and
//! long idle. Scenarios are assigned by the last IMEI digit and advance
//! by step counters with a fixed per-tick duration; there is no
//! randomness, so every run reproduces the same readings.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use super::GpsProvider;
use crate::domain::geo::{destination_point, LatLng};
use crate::domain::Imei;
use crate::error::PipelineError;
use crate::normalize::RawSample;

/// Scripted behavior for one simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Normal,
    FuelTheft,
    OdometerTamper,
    RouteDeviation,
    LongIdle,
}

/// Scenario table over the last IMEI digit: half the fleet drives
/// normally, the rest exercise one anomaly each.
const fn scenario_for(last_digit: u8) -> Scenario {
    match last_digit {
        0..=4 => Scenario::Normal,
        5 | 6 => Scenario::FuelTheft,
        7 => Scenario::OdometerTamper,
        8 => Scenario::RouteDeviation,
        _ => Scenario::LongIdle,
    }
}

/// Restricted area the route-deviation scenario converges on.
const RESTRICTED: LatLng = LatLng::new(28.65, 77.25);

#[derive(Debug)]
struct SimVehicle {
    imei: Imei,
    position: LatLng,
    heading_deg: f64,
    speed: f64,
    ignition: bool,
    fuel_l: f64,
    odometer_km: f64,
    scenario: Scenario,
    step: u32,
}

impl SimVehicle {
    fn new(imei: Imei) -> Self {
        let d = f64::from(imei.last_digit());
        Self {
            // Spread the fleet over the Delhi region by IMEI digit.
            position: LatLng::new(28.6139 + d * 0.01, 77.2090 + d * 0.01),
            heading_deg: d * 36.0,
            speed: 0.0,
            ignition: false,
            fuel_l: 40.0 + d,
            odometer_km: 10_000.0 + d * 1_000.0,
            scenario: scenario_for(imei.last_digit()),
            step: 0,
            imei,
        }
    }

    fn advance(&mut self, dt_secs: f64) {
        match self.scenario {
            Scenario::Normal => self.drive_normally(dt_secs),
            Scenario::FuelTheft => {
                match self.step {
                    0..=99 => self.drive_normally(dt_secs),
                    100..=104 => {
                        self.ignition = false;
                        self.speed = 0.0;
                    }
                    // The theft itself: 25 L gone with the engine off.
                    105 => self.fuel_l = (self.fuel_l - 25.0).max(0.0),
                    106..=110 => {}
                    _ => {
                        self.ignition = true;
                        self.drive_normally(dt_secs);
                    }
                }
            }
            Scenario::OdometerTamper => {
                self.ignition = true;
                self.speed = 50.0 + f64::from(self.step % 20);
                let distance_km = self.speed * dt_secs / 3600.0;
                self.position = destination_point(self.position, self.heading_deg, distance_km);
                // Tamper: the dash odometer credits only half the distance.
                self.odometer_km += distance_km * 0.5;
                self.burn(distance_km / 10.0);
            }
            Scenario::RouteDeviation => {
                if self.step < 50 {
                    self.drive_normally(dt_secs);
                } else {
                    self.ignition = true;
                    self.speed = 60.0;
                    self.position = LatLng::new(
                        self.position.lat + (RESTRICTED.lat - self.position.lat) * 0.01,
                        self.position.lng + (RESTRICTED.lng - self.position.lng) * 0.01,
                    );
                    self.odometer_km += 0.5;
                    self.burn(0.05);
                }
            }
            Scenario::LongIdle => {
                self.ignition = true;
                self.speed = 0.0;
                // Idle burn of roughly one liter per hour.
                self.fuel_l = (self.fuel_l - dt_secs / 3600.0).max(0.0);
                if self.fuel_l < 5.0 {
                    self.fuel_l = 50.0;
                }
            }
        }
        self.step += 1;
    }

    fn drive_normally(&mut self, dt_secs: f64) {
        self.ignition = true;
        self.speed = 40.0 + f64::from(self.step % 30);
        let distance_km = self.speed * dt_secs / 3600.0;
        self.position = destination_point(self.position, self.heading_deg, distance_km);
        self.odometer_km += distance_km;
        self.burn(distance_km / 10.0);
        if self.step % 10 == 9 {
            self.heading_deg = (self.heading_deg + 15.0) % 360.0;
        }
    }

    fn burn(&mut self, liters: f64) {
        self.fuel_l = (self.fuel_l - liters).max(0.0);
        if self.fuel_l < 10.0 {
            self.fuel_l = 55.0;
        }
    }

    fn reading(&self, at: DateTime<Utc>) -> RawSample {
        RawSample {
            imei: self.imei.to_string(),
            timestamp: Some(at),
            latitude: Some(self.position.lat),
            longitude: Some(self.position.lng),
            speed: Some(self.speed),
            ignition: Some(self.ignition),
            motion: Some(self.speed > 0.0),
            fuel_level: Some(self.fuel_l),
            odometer: Some(self.odometer_km),
            raw: None,
        }
    }
}

#[derive(Debug)]
struct SimState {
    vehicles: HashMap<Imei, SimVehicle>,
    clock: DateTime<Utc>,
}

/// Deterministic scripted GPS source.
#[derive(Debug)]
pub struct SimulatorProvider {
    state: Mutex<SimState>,
    tick: TimeDelta,
}

impl SimulatorProvider {
    /// Creates a simulator over the given fleet with a 10-second tick.
    #[must_use]
    pub fn new(fleet: Vec<Imei>) -> Self {
        Self::with_clock(fleet, Utc::now(), 10)
    }

    /// Creates a simulator with an explicit start time and tick length,
    /// for reproducible test runs.
    #[must_use]
    pub fn with_clock(fleet: Vec<Imei>, start: DateTime<Utc>, tick_secs: i64) -> Self {
        let vehicles = fleet
            .into_iter()
            .map(|imei| (imei.clone(), SimVehicle::new(imei)))
            .collect();
        Self {
            state: Mutex::new(SimState {
                vehicles,
                clock: start,
            }),
            tick: TimeDelta::seconds(tick_secs),
        }
    }
}

#[async_trait]
impl GpsProvider for SimulatorProvider {
    fn name(&self) -> &'static str {
        "simulator"
    }

    async fn initialize(&self) -> Result<(), PipelineError> {
        let state = self.state.lock().await;
        tracing::info!(vehicles = state.vehicles.len(), "simulator initialized");
        Ok(())
    }

    async fn fetch_telemetry(&self) -> Result<Vec<RawSample>, PipelineError> {
        let mut state = self.state.lock().await;
        state.clock += self.tick;
        let at = state.clock;
        let dt_secs = self.tick.num_seconds() as f64;

        let mut batch: Vec<RawSample> = state
            .vehicles
            .values_mut()
            .map(|vehicle| {
                vehicle.advance(dt_secs);
                vehicle.reading(at)
            })
            .collect();
        batch.sort_by(|a, b| a.imei.cmp(&b.imei));
        Ok(batch)
    }

    async fn fetch_single(&self, imei: &Imei) -> Result<Option<RawSample>, PipelineError> {
        let mut state = self.state.lock().await;
        state.clock += self.tick;
        let at = state.clock;
        let dt_secs = self.tick.num_seconds() as f64;

        Ok(state.vehicles.get_mut(imei).map(|vehicle| {
            vehicle.advance(dt_secs);
            vehicle.reading(at)
        }))
    }

    async fn shutdown(&self) {
        tracing::info!("simulator shut down");
    }
}
