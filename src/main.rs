//! fleetwatch service entry point.
//!
//! Wires the store, event bus, pipeline, and polling harness together,
//! then runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use fleetwatch::config::{PipelineConfig, ProviderKind};
use fleetwatch::domain::{EventBus, VehicleRegistry};
use fleetwatch::persistence::{PostgresStore, TelemetryStore, VehicleStatus};
use fleetwatch::pipeline::Pipeline;
use fleetwatch::poller::PollerHarness;
use fleetwatch::provider::{GpsProvider, MilitrackProvider, SimulatorProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = PipelineConfig::from_env()?;
    tracing::info!(provider = ?config.provider, "starting fleetwatch");

    // Connect the record store
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    let store: Arc<dyn TelemetryStore> = Arc::new(PostgresStore::new(pool));

    // Build domain layer
    let registry = Arc::new(VehicleRegistry::new());
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build the pipeline and reconcile the active-trip registry
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&store),
        registry,
        event_bus,
        config.thresholds.clone(),
        config.worker_queue_capacity,
    ));
    pipeline.restore_active_trips().await?;

    // Build the provider and the polling harness
    let provider: Arc<dyn GpsProvider> = match config.provider {
        ProviderKind::Simulator => {
            let fleet = store
                .list_vehicles()
                .await?
                .into_iter()
                .filter(|v| v.status == VehicleStatus::Active)
                .map(|v| v.imei)
                .collect();
            Arc::new(SimulatorProvider::new(fleet))
        }
        ProviderKind::Militrack => Arc::new(MilitrackProvider::new(
            config.militrack_base_url.clone(),
            config.militrack_token.clone(),
        )),
    };
    let poller = PollerHarness::new(
        provider,
        Arc::clone(&pipeline),
        Duration::from_millis(config.poll_interval_ms),
    );
    poller.start().await?;

    // Run until interrupted, then drain
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    poller.stop().await;
    pipeline.shutdown().await;

    Ok(())
}
