//! Telemetry processing pipeline.
//!
//! Ingestion runs validation, normalization, vehicle resolution, and
//! motion classification synchronously, then hands the sample to a
//! per-vehicle worker task and returns. One worker per vehicle id
//! serializes everything that touches that vehicle's mutable state:
//! runtime-state updates, the four analysis engines, persistence writes,
//! and broadcast. Samples for different vehicles process concurrently.
//!
//! Duplicate/out-of-order policy: a sample whose timestamp is not
//! strictly newer than the vehicle's last processed sample is dropped
//! with a warning before touching any state, which makes replays
//! idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::Thresholds;
use crate::domain::geo::haversine_km;
use crate::domain::{
    EventBus, TelemetryEvent, TelemetrySample, VehicleId, VehicleRegistry, VehicleState,
};
use crate::engine::{FuelEngine, GeofenceEvaluator, OdometerDetector, TripTracker};
use crate::error::PipelineError;
use crate::normalize::{self, IngestPayload, RawSample};
use crate::persistence::{TelemetryStore, VehicleRecord};

/// One unit of per-vehicle work: a classified sample ready for analysis.
#[derive(Debug)]
struct Job {
    vehicle: VehicleRecord,
    sample: TelemetrySample,
    state: VehicleState,
}

#[derive(Debug)]
struct Worker {
    tx: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
}

/// Everything the worker tasks need, shared behind one `Arc`.
#[derive(Debug)]
struct ProcessCtx {
    store: Arc<dyn TelemetryStore>,
    registry: Arc<VehicleRegistry>,
    bus: EventBus,
    thresholds: Thresholds,
    fuel: FuelEngine,
    odometer: OdometerDetector,
    geofence: GeofenceEvaluator,
    trips: TripTracker,
}

/// The telemetry pipeline: ingestion entry point plus worker dispatch.
#[derive(Debug)]
pub struct Pipeline {
    ctx: Arc<ProcessCtx>,
    workers: Mutex<HashMap<VehicleId, Worker>>,
    queue_capacity: usize,
}

impl Pipeline {
    /// Builds the pipeline and its four engines.
    #[must_use]
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        registry: Arc<VehicleRegistry>,
        bus: EventBus,
        thresholds: Thresholds,
        queue_capacity: usize,
    ) -> Self {
        let ctx = ProcessCtx {
            fuel: FuelEngine::new(Arc::clone(&store), bus.clone(), thresholds.clone()),
            odometer: OdometerDetector::new(Arc::clone(&store), bus.clone(), thresholds.clone()),
            geofence: GeofenceEvaluator::new(Arc::clone(&store), bus.clone(), thresholds.clone()),
            trips: TripTracker::new(Arc::clone(&store), bus.clone(), thresholds.clone()),
            store,
            registry,
            bus,
            thresholds,
        };
        Self {
            ctx: Arc::new(ctx),
            workers: Mutex::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Reseeds the active-trip registry from the store.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persistence`] when the store cannot be read.
    pub async fn restore_active_trips(&self) -> Result<usize, PipelineError> {
        let restored = self.ctx.trips.restore().await?;
        if restored > 0 {
            tracing::info!(restored, "restored active trips from store");
        }
        Ok(restored)
    }

    /// Ingests one pushed sample (the external ingestion contract).
    ///
    /// Validation failures reject the sample before any state mutation.
    /// An unknown IMEI drops the sample with a warning and is not an
    /// error. On success the sample is queued for its vehicle's worker
    /// and this call returns without waiting for analysis.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSample`] on shape violations and
    /// [`PipelineError::Persistence`] when the vehicle lookup fails.
    pub async fn ingest(&self, payload: IngestPayload) -> Result<(), PipelineError> {
        self.ingest_raw(RawSample::from(payload)).await
    }

    /// Ingests one provider-side reading (lenient wire shape).
    ///
    /// # Errors
    ///
    /// Same contract as [`Pipeline::ingest`].
    pub async fn ingest_raw(&self, raw: RawSample) -> Result<(), PipelineError> {
        let sample = normalize::canonicalize(raw)?;

        let Some(vehicle) = self.ctx.store.find_vehicle_by_imei(&sample.imei).await? else {
            tracing::warn!(imei = %sample.imei, "dropping sample for unknown vehicle");
            return Ok(());
        };

        let state = normalize::classify(&sample, &self.ctx.thresholds);
        self.dispatch(Job {
            vehicle,
            sample,
            state,
        })
        .await;
        Ok(())
    }

    /// Queues a job onto its vehicle's worker, spawning the worker on
    /// first use.
    async fn dispatch(&self, job: Job) {
        let vehicle_id = job.vehicle.id;
        let mut workers = self.workers.lock().await;

        let worker = workers
            .entry(vehicle_id)
            .or_insert_with(|| spawn_worker(Arc::clone(&self.ctx), vehicle_id, self.queue_capacity));

        if let Err(err) = worker.tx.send(job).await {
            // Worker gone (only after shutdown); the sample is lost and
            // re-fetched on the next natural poll.
            tracing::warn!(%vehicle_id, %err, "worker queue closed, sample dropped");
        }
    }

    /// Stops accepting work and waits for every worker to drain its queue.
    pub async fn shutdown(&self) {
        let workers: Vec<Worker> = {
            let mut map = self.workers.lock().await;
            map.drain().map(|(_, w)| w).collect()
        };
        for worker in workers {
            drop(worker.tx);
            if let Err(err) = worker.handle.await {
                tracing::error!(%err, "worker task failed during shutdown");
            }
        }
        tracing::info!("pipeline workers drained");
    }
}

fn spawn_worker(ctx: Arc<ProcessCtx>, vehicle_id: VehicleId, capacity: usize) -> Worker {
    let (tx, mut rx) = mpsc::channel::<Job>(capacity);
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            process_sample(&ctx, &job).await;
        }
        tracing::debug!(%vehicle_id, "vehicle worker drained");
    });
    Worker { tx, handle }
}

/// Full per-sample processing: guard, runtime-state update, persistence,
/// the four engines, and broadcast. Never panics; every failure is logged
/// and the remaining steps still run.
async fn process_sample(ctx: &ProcessCtx, job: &Job) {
    let vehicle = &job.vehicle;
    let sample = &job.sample;
    let state = job.state;

    let entry = ctx.registry.entry(vehicle.id).await;
    let mut runtime = entry.write().await;

    if let Some(last) = runtime.last_timestamp()
        && sample.timestamp <= last
    {
        tracing::warn!(
            vehicle = vehicle.label(),
            timestamp = %sample.timestamp,
            last = %last,
            "dropping duplicate or out-of-order sample"
        );
        return;
    }

    let previous = runtime.last_sample.clone();
    let distance_km = previous
        .as_ref()
        .map_or(0.0, |p| haversine_km(p.position(), sample.position()));

    let credit_distance = distance_km > ctx.thresholds.min_distance_km;
    if credit_distance {
        runtime.accumulate_distance(distance_km);
    }
    if let Some(odo) = sample.odometer {
        runtime.dash_odometer_km = Some(odo);
    }
    runtime.last_sample = Some(sample.clone());
    runtime.last_state = Some(state);
    drop(runtime);

    // Persistence writes degrade on failure: classification and runtime
    // tracking continue without them.
    if let Err(err) = ctx.store.insert_sample(vehicle.id, sample).await {
        tracing::warn!(vehicle = vehicle.label(), %err, "failed to store sample");
    }
    if let Err(err) = ctx
        .store
        .update_vehicle_position(vehicle.id, sample, state)
        .await
    {
        tracing::warn!(vehicle = vehicle.label(), %err, "failed to update vehicle position");
    }
    if credit_distance
        && let Err(err) = ctx.store.add_gps_distance(vehicle.id, distance_km).await
    {
        tracing::warn!(vehicle = vehicle.label(), %err, "failed to credit gps distance");
    }
    if let Some(odo) = sample.odometer
        && let Err(err) = ctx.store.set_dash_odometer(vehicle.id, odo).await
    {
        tracing::warn!(vehicle = vehicle.label(), %err, "failed to update dash odometer");
    }

    // Engines are order-independent and isolated: one failing never
    // stops the others, nor future samples.
    let previous_ref = previous.as_ref();
    if let Err(err) = ctx
        .fuel
        .process(vehicle.id, sample, previous_ref, distance_km)
        .await
    {
        log_engine_failure("fuel", &err);
    }
    if let Err(err) = ctx.odometer.process(vehicle.id, sample, previous_ref).await {
        log_engine_failure("odometer", &err);
    }
    if let Err(err) = ctx.geofence.process(vehicle.id, sample).await {
        log_engine_failure("geofence", &err);
    }
    if let Err(err) = ctx
        .trips
        .process(vehicle.id, sample, previous_ref, state)
        .await
    {
        log_engine_failure("trip", &err);
    }

    let _ = ctx.bus.publish(TelemetryEvent::PositionUpdated {
        vehicle_id: vehicle.id,
        imei: sample.imei.clone(),
        latitude: sample.latitude,
        longitude: sample.longitude,
        speed: sample.speed,
        ignition: sample.ignition,
        state,
        timestamp: sample.timestamp,
    });

    tracing::debug!(
        vehicle = vehicle.label(),
        state = state.as_str(),
        distance_km,
        "sample processed"
    );
}

fn log_engine_failure(engine: &'static str, cause: &PipelineError) {
    let err = PipelineError::Engine {
        engine,
        message: cause.to_string(),
    };
    tracing::error!(%err, "analysis engine failed");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::domain::{Geofence, Imei, LatLng, TripStatus};
    use crate::persistence::MemoryStore;

    const IMEI: &str = "356938035643809";

    fn pipeline_with(store: &Arc<MemoryStore>) -> Pipeline {
        Pipeline::new(
            Arc::clone(store) as Arc<dyn TelemetryStore>,
            Arc::new(VehicleRegistry::new()),
            EventBus::new(64),
            Thresholds::default(),
            64,
        )
    }

    fn raw(minutes: i64, lat: f64, speed: f64, ignition: bool, fuel: f64) -> RawSample {
        let Some(offset) = TimeDelta::try_minutes(minutes) else {
            panic!("valid offset");
        };
        RawSample {
            imei: IMEI.to_string(),
            timestamp: Some(Utc::now() + offset),
            latitude: Some(lat),
            longitude: Some(77.2090),
            speed: Some(speed),
            ignition: Some(ignition),
            fuel_level: Some(fuel),
            ..RawSample::default()
        }
    }

    async fn ingest_ok(pipeline: &Pipeline, sample: RawSample) {
        let result = pipeline.ingest_raw(sample).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn ingest_accepts_the_push_contract() {
        let store = Arc::new(MemoryStore::new());
        let Ok(imei) = Imei::parse(IMEI) else {
            panic!("valid imei");
        };
        store.add_vehicle(imei, None).await;
        let pipeline = pipeline_with(&store);

        let json = format!(
            r#"{{"imei":"{IMEI}","timestamp":"2026-01-15T08:30:00Z","latitude":28.6,"longitude":77.2,"speed":42.0,"ignition":true,"fuelLevel":55.0}}"#
        );
        let Ok(payload) = serde_json::from_str::<IngestPayload>(&json) else {
            panic!("contract-shaped payload parses");
        };
        let result = pipeline.ingest(payload).await;
        assert!(result.is_ok());
        pipeline.shutdown().await;
        assert_eq!(store.sample_count().await, 1);
    }

    #[tokio::test]
    async fn rejects_malformed_payload_before_processing() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(&store);

        let mut bad = raw(0, 28.60, 40.0, true, 60.0);
        bad.latitude = Some(95.0);
        let result = pipeline.ingest_raw(bad).await;
        assert!(matches!(result, Err(PipelineError::InvalidSample(_))));
        assert_eq!(store.sample_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_imei_is_dropped_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(&store);

        let result = pipeline.ingest_raw(raw(0, 28.60, 40.0, true, 60.0)).await;
        assert!(result.is_ok());
        pipeline.shutdown().await;
        assert_eq!(store.sample_count().await, 0);
    }

    #[tokio::test]
    async fn processes_samples_and_accumulates_state() {
        let store = Arc::new(MemoryStore::new());
        let Ok(imei) = Imei::parse(IMEI) else {
            panic!("valid imei");
        };
        let vehicle_id = store.add_vehicle(imei, None).await;
        let pipeline = pipeline_with(&store);

        ingest_ok(&pipeline, raw(0, 28.60, 40.0, true, 60.0)).await;
        let mut second = raw(2, 28.62, 45.0, true, 59.5);
        second.odometer = Some(120_342.0);
        ingest_ok(&pipeline, second).await;
        pipeline.shutdown().await;

        assert_eq!(store.sample_count().await, 2);
        // One ~2.22 km segment credited to the GPS odometer.
        let odometer = store.gps_odometer(vehicle_id).await;
        assert!((odometer - 2.22).abs() < 0.05, "got {odometer}");

        // Last-known position reflects the newest sample.
        let Some((last, state)) = store.last_position(vehicle_id).await else {
            panic!("position updated");
        };
        assert_eq!(last.latitude, 28.62);
        assert_eq!(state, VehicleState::Moving);
        assert_eq!(store.dash_odometer(vehicle_id).await, Some(120_342.0));

        // Moving with ignition on: a trip opened.
        let trips = store.trips().await;
        assert_eq!(trips.len(), 1);
        let Some(trip) = trips.first() else {
            panic!("one trip");
        };
        assert_eq!(trip.status, TripStatus::Active);
    }

    #[tokio::test]
    async fn replayed_sample_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let Ok(imei) = Imei::parse(IMEI) else {
            panic!("valid imei");
        };
        let vehicle_id = store.add_vehicle(imei, None).await;
        let pipeline = pipeline_with(&store);

        let first = raw(0, 28.60, 40.0, true, 60.0);
        let second = raw(2, 28.62, 45.0, true, 59.5);
        ingest_ok(&pipeline, first.clone()).await;
        ingest_ok(&pipeline, second.clone()).await;
        // Replay both: identical timestamps must change nothing.
        ingest_ok(&pipeline, first).await;
        ingest_ok(&pipeline, second).await;
        pipeline.shutdown().await;

        assert_eq!(store.sample_count().await, 2);
        let odometer = store.gps_odometer(vehicle_id).await;
        assert!((odometer - 2.22).abs() < 0.05, "got {odometer}");
        assert_eq!(store.trips().await.len(), 1);
    }

    #[tokio::test]
    async fn out_of_order_sample_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let Ok(imei) = Imei::parse(IMEI) else {
            panic!("valid imei");
        };
        store.add_vehicle(imei, None).await;
        let pipeline = pipeline_with(&store);

        ingest_ok(&pipeline, raw(10, 28.62, 45.0, true, 59.5)).await;
        // Older than the last processed sample: rejected by the guard.
        ingest_ok(&pipeline, raw(5, 28.60, 40.0, true, 60.0)).await;
        pipeline.shutdown().await;

        assert_eq!(store.sample_count().await, 1);
    }

    #[tokio::test]
    async fn fans_out_to_all_engines() {
        let store = Arc::new(MemoryStore::new());
        let Ok(imei) = Imei::parse(IMEI) else {
            panic!("valid imei");
        };
        store.add_vehicle(imei, None).await;
        store
            .add_geofence(Geofence::circle("depot", LatLng::new(28.62, 77.2090), 500.0))
            .await;
        let pipeline = pipeline_with(&store);

        // Drive toward the depot, then a theft-shaped fuel drop at rest.
        ingest_ok(&pipeline, raw(0, 28.60, 40.0, true, 60.0)).await;
        ingest_ok(&pipeline, raw(2, 28.62, 45.0, true, 59.5)).await;
        let mut theft = raw(7, 28.62, 0.0, false, 34.5);
        theft.motion = Some(false);
        ingest_ok(&pipeline, theft).await;
        pipeline.shutdown().await;

        // Geofence entry at the second sample.
        assert_eq!(store.geofence_events().await.len(), 1);
        // Theft recorded by the fuel engine.
        let fuel_events = store.fuel_events().await;
        assert_eq!(fuel_events.len(), 1);
        // Alerts from both engines.
        assert!(store.alerts().await.len() >= 2);
    }

    #[tokio::test]
    async fn publishes_position_updates() {
        let store = Arc::new(MemoryStore::new());
        let Ok(imei) = Imei::parse(IMEI) else {
            panic!("valid imei");
        };
        store.add_vehicle(imei, None).await;

        let bus = EventBus::new(64);
        let pipeline = Pipeline::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Arc::new(VehicleRegistry::new()),
            bus.clone(),
            Thresholds::default(),
            64,
        );
        let mut rx = bus.subscribe();

        ingest_ok(&pipeline, raw(0, 28.60, 40.0, true, 60.0)).await;
        pipeline.shutdown().await;

        // Skip engine events until the position update arrives.
        loop {
            let Ok(event) = rx.try_recv() else {
                panic!("expected a position update on the bus");
            };
            if event.topic() == "vehicle:update" {
                break;
            }
        }
    }
}
