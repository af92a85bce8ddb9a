//! PostgreSQL implementation of the persistence collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{TelemetryStore, VehicleRecord, VehicleStatus};
use crate::domain::{
    Alert, AlertId, FuelEvent, Geofence, GeofenceEvent, GeofenceGeometry, GeofenceId, Imei,
    LatLng, TelemetrySample, Trip, TripId, TripStatus, VehicleId, VehicleState,
};
use crate::error::PipelineError;

/// PostgreSQL-backed record store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> PipelineError {
    PipelineError::Persistence(e.to_string())
}

#[async_trait]
impl TelemetryStore for PostgresStore {
    async fn find_vehicle_by_imei(
        &self,
        imei: &Imei,
    ) -> Result<Option<VehicleRecord>, PipelineError> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<String>, String)>(
            "SELECT id, imei, registration_no, status FROM vehicles WHERE imei = $1",
        )
        .bind(imei.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|(id, imei, registration_no, status)| {
            Ok(VehicleRecord {
                id: VehicleId::from_uuid(id),
                imei: Imei::parse(&imei)
                    .map_err(|_| PipelineError::Persistence(format!("vehicle {id} has a malformed imei")))?,
                registration_no,
                status: VehicleStatus::from_str_lossy(&status),
            })
        })
        .transpose()
    }

    async fn list_vehicles(&self) -> Result<Vec<VehicleRecord>, PipelineError> {
        let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, String)>(
            "SELECT id, imei, registration_no, status FROM vehicles ORDER BY imei",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut vehicles = Vec::with_capacity(rows.len());
        for (id, imei, registration_no, status) in rows {
            match Imei::parse(&imei) {
                Ok(imei) => vehicles.push(VehicleRecord {
                    id: VehicleId::from_uuid(id),
                    imei,
                    registration_no,
                    status: VehicleStatus::from_str_lossy(&status),
                }),
                Err(_) => {
                    tracing::warn!(vehicle_id = %id, %imei, "skipping vehicle with malformed imei");
                }
            }
        }
        Ok(vehicles)
    }

    async fn insert_sample(
        &self,
        vehicle_id: VehicleId,
        sample: &TelemetrySample,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO telemetry_samples \
             (vehicle_id, timestamp, latitude, longitude, speed, ignition, motion, fuel_level, odometer, raw) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(vehicle_id.as_uuid())
        .bind(sample.timestamp)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.speed)
        .bind(sample.ignition)
        .bind(sample.motion)
        .bind(sample.fuel_level)
        .bind(sample.odometer)
        .bind(sample.raw.as_ref())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_vehicle_position(
        &self,
        vehicle_id: VehicleId,
        sample: &TelemetrySample,
        state: VehicleState,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            "UPDATE vehicles SET last_lat = $2, last_lng = $3, last_speed = $4, \
             last_ignition = $5, last_state = $6, last_seen = $7 WHERE id = $1",
        )
        .bind(vehicle_id.as_uuid())
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.speed)
        .bind(sample.ignition)
        .bind(state.as_str())
        .bind(sample.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn add_gps_distance(&self, vehicle_id: VehicleId, km: f64) -> Result<(), PipelineError> {
        sqlx::query("UPDATE vehicles SET gps_odometer = gps_odometer + $2 WHERE id = $1")
            .bind(vehicle_id.as_uuid())
            .bind(km)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_dash_odometer(
        &self,
        vehicle_id: VehicleId,
        km: f64,
    ) -> Result<(), PipelineError> {
        sqlx::query("UPDATE vehicles SET dash_odometer = $2 WHERE id = $1")
            .bind(vehicle_id.as_uuid())
            .bind(km)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_fuel_event(&self, event: &FuelEvent) -> Result<(), PipelineError> {
        let evidence = serde_json::to_value(&event.evidence)
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;
        sqlx::query(
            "INSERT INTO fuel_events \
             (vehicle_id, timestamp, event_type, pattern, severity, delta, confidence, evidence, \
              engine_state, previous_level, current_level, distance_km) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(event.vehicle_id.as_uuid())
        .bind(event.timestamp)
        .bind(event.event_type.as_str())
        .bind(event.pattern.map(|p| p.as_str()))
        .bind(event.severity.as_str())
        .bind(event.delta)
        .bind(i16::from(event.confidence))
        .bind(evidence)
        .bind(event.engine_state.as_str())
        .bind(event.previous_level)
        .bind(event.current_level)
        .bind(event.distance_km)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO alerts (id, vehicle_id, type, severity, message, metadata, resolved, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(alert.id.as_uuid())
        .bind(alert.vehicle_id.map(|v| *v.as_uuid()))
        .bind(alert.kind.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(&alert.metadata)
        .bind(alert.resolved)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn resolve_alert(
        &self,
        alert_id: AlertId,
        resolved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            "UPDATE alerts SET resolved = TRUE, resolved_by = $2, resolved_at = $3 WHERE id = $1",
        )
        .bind(alert_id.as_uuid())
        .bind(resolved_by)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_geofence_event(&self, event: &GeofenceEvent) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO geofence_events (vehicle_id, geofence_id, transition, latitude, longitude, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.vehicle_id.as_uuid())
        .bind(event.geofence_id.as_uuid())
        .bind(event.transition.as_str())
        .bind(event.position.lat)
        .bind(event.position.lng)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_geofences(&self, active_only: bool) -> Result<Vec<Geofence>, PipelineError> {
        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                String,
                String,
                Option<f64>,
                Option<f64>,
                Option<f64>,
                Option<serde_json::Value>,
                bool,
                bool,
            ),
        >(
            "SELECT id, name, type, center_lat, center_lng, radius_m, polygon, active, reverse \
             FROM geofences WHERE active OR NOT $1",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut fences = Vec::with_capacity(rows.len());
        for (id, name, kind, center_lat, center_lng, radius_m, polygon, active, reverse) in rows {
            let geometry = match kind.as_str() {
                "circle" => match (center_lat, center_lng, radius_m) {
                    (Some(lat), Some(lng), Some(radius_m)) => Some(GeofenceGeometry::Circle {
                        center: LatLng::new(lat, lng),
                        radius_m,
                    }),
                    _ => None,
                },
                "polygon" => polygon
                    .and_then(|v| serde_json::from_value::<Vec<LatLng>>(v).ok())
                    .filter(|vertices| vertices.len() >= 3)
                    .map(|vertices| GeofenceGeometry::Polygon { vertices }),
                _ => None,
            };
            match geometry {
                Some(geometry) => fences.push(Geofence {
                    id: GeofenceId::from_uuid(id),
                    name,
                    geometry,
                    active,
                    reverse,
                }),
                None => {
                    tracing::warn!(geofence_id = %id, %kind, "skipping geofence with malformed geometry");
                }
            }
        }
        Ok(fences)
    }

    async fn create_trip(&self, trip: &Trip) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO trips \
             (id, vehicle_id, status, start_time, start_lat, start_lng, start_odometer, start_fuel, \
              distance_km, fuel_consumed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(trip.id.as_uuid())
        .bind(trip.vehicle_id.as_uuid())
        .bind(trip.status.as_str())
        .bind(trip.start_time)
        .bind(trip.start_position.lat)
        .bind(trip.start_position.lng)
        .bind(trip.start_odometer)
        .bind(trip.start_fuel)
        .bind(trip.distance_km)
        .bind(trip.fuel_consumed)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_trip_progress(
        &self,
        trip_id: TripId,
        distance_km: f64,
        fuel_consumed: f64,
    ) -> Result<(), PipelineError> {
        let result = sqlx::query(
            "UPDATE trips SET distance_km = $2, fuel_consumed = $3 \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(trip_id.as_uuid())
        .bind(distance_km)
        .bind(fuel_consumed)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::TripNotFound(*trip_id.as_uuid()));
        }
        Ok(())
    }

    async fn complete_trip(&self, trip: &Trip) -> Result<(), PipelineError> {
        let result = sqlx::query(
            "UPDATE trips SET status = $2, end_time = $3, end_lat = $4, end_lng = $5, \
             end_odometer = $6, end_fuel = $7, distance_km = $8, fuel_consumed = $9 \
             WHERE id = $1",
        )
        .bind(trip.id.as_uuid())
        .bind(trip.status.as_str())
        .bind(trip.end_time)
        .bind(trip.end_position.map(|p| p.lat))
        .bind(trip.end_position.map(|p| p.lng))
        .bind(trip.end_odometer)
        .bind(trip.end_fuel)
        .bind(trip.distance_km)
        .bind(trip.fuel_consumed)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::TripNotFound(*trip.id.as_uuid()));
        }
        Ok(())
    }

    async fn list_active_trips(&self) -> Result<Vec<Trip>, PipelineError> {
        let rows = sqlx::query_as::<
            _,
            (
                Uuid,
                Uuid,
                DateTime<Utc>,
                f64,
                f64,
                Option<f64>,
                Option<f64>,
                f64,
                f64,
            ),
        >(
            "SELECT id, vehicle_id, start_time, start_lat, start_lng, start_odometer, start_fuel, \
             distance_km, fuel_consumed FROM trips WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    vehicle_id,
                    start_time,
                    start_lat,
                    start_lng,
                    start_odometer,
                    start_fuel,
                    distance_km,
                    fuel_consumed,
                )| Trip {
                    id: TripId::from_uuid(id),
                    vehicle_id: VehicleId::from_uuid(vehicle_id),
                    status: TripStatus::Active,
                    start_time,
                    end_time: None,
                    start_position: LatLng::new(start_lat, start_lng),
                    end_position: None,
                    start_odometer,
                    end_odometer: None,
                    start_fuel,
                    end_fuel: None,
                    distance_km,
                    fuel_consumed,
                },
            )
            .collect())
    }
}
