//! Provider polling harness.
//!
//! On a fixed wall-clock interval, fetches a batch of raw readings from
//! the configured [`GpsProvider`] and feeds them to the pipeline. Each
//! tick's fetch-and-dispatch runs as its own task so a slow tick never
//! delays the next tick's schedule; per-vehicle ordering is preserved by
//! the pipeline's worker queues, not here. A failed poll is logged and
//! the tick skipped; it never stops the harness.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::provider::GpsProvider;

#[derive(Debug, Default)]
struct HarnessState {
    running: bool,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Periodic polling harness over a pluggable GPS provider.
#[derive(Debug)]
pub struct PollerHarness {
    provider: Arc<dyn GpsProvider>,
    pipeline: Arc<Pipeline>,
    interval: Duration,
    state: Mutex<HarnessState>,
}

impl PollerHarness {
    /// Creates a stopped harness.
    #[must_use]
    pub fn new(provider: Arc<dyn GpsProvider>, pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self {
            provider,
            pipeline,
            interval,
            state: Mutex::new(HarnessState::default()),
        }
    }

    /// Initializes the provider and starts the polling loop. The first
    /// poll fires immediately. Idempotent: a second call while running
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Provider`] when provider initialization
    /// fails; the harness stays stopped.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if state.running {
            tracing::debug!("poller already running");
            return Ok(());
        }

        self.provider.initialize().await?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let provider = Arc::clone(&self.provider);
        let pipeline = Arc::clone(&self.pipeline);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let provider = Arc::clone(&provider);
                        let pipeline = Arc::clone(&pipeline);
                        tokio::spawn(async move {
                            poll_once(provider.as_ref(), &pipeline).await;
                        });
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::debug!("poll loop exited");
        });

        state.running = true;
        state.stop_tx = Some(stop_tx);
        state.task = Some(task);
        tracing::info!(
            provider = self.provider.name(),
            interval_ms = self.interval.as_millis() as u64,
            "gps poller started"
        );
        Ok(())
    }

    /// Stops the polling loop and shuts the provider down. Already
    /// dispatched per-sample work keeps draining in the pipeline.
    /// Idempotent: stopping a stopped harness is a no-op.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if !state.running {
            return;
        }

        if let Some(stop_tx) = state.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = state.task.take()
            && let Err(err) = task.await
        {
            tracing::error!(%err, "poll loop task failed");
        }
        self.provider.shutdown().await;
        state.running = false;
        tracing::info!("gps poller stopped");
    }

    /// Whether the polling loop is currently running.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }
}

/// One poll: fetch the batch and feed every reading to the pipeline.
async fn poll_once(provider: &dyn GpsProvider, pipeline: &Pipeline) {
    let started = std::time::Instant::now();
    let batch = match provider.fetch_telemetry().await {
        Ok(batch) => batch,
        Err(err) if err.is_transient() => {
            tracing::warn!(provider = provider.name(), %err, "poll failed, skipping tick");
            return;
        }
        Err(err) => {
            tracing::error!(provider = provider.name(), %err, "poll failed, skipping tick");
            return;
        }
    };
    if batch.is_empty() {
        tracing::debug!(provider = provider.name(), "no telemetry received");
        return;
    }

    let count = batch.len();
    for raw in batch {
        let imei = raw.imei.clone();
        if let Err(err) = pipeline.ingest_raw(raw).await {
            tracing::warn!(%imei, %err, "failed to ingest polled sample");
        }
    }
    tracing::debug!(
        provider = provider.name(),
        vehicles = count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "telemetry poll completed"
    );
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::Thresholds;
    use crate::domain::{EventBus, Imei, VehicleRegistry};
    use crate::persistence::{MemoryStore, TelemetryStore};
    use crate::provider::SimulatorProvider;

    fn imei() -> Imei {
        let Ok(imei) = Imei::parse("356938035643800") else {
            panic!("valid imei");
        };
        imei
    }

    async fn harness() -> (Arc<MemoryStore>, PollerHarness) {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle(imei(), None).await;

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Arc::new(VehicleRegistry::new()),
            EventBus::new(64),
            Thresholds::default(),
            64,
        ));
        let Some(start) = Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).single() else {
            panic!("valid start");
        };
        let provider = Arc::new(SimulatorProvider::with_clock(vec![imei()], start, 10));
        let poller = PollerHarness::new(provider, pipeline, Duration::from_millis(20));
        (store, poller)
    }

    #[tokio::test]
    async fn polls_and_feeds_the_pipeline() {
        let (store, poller) = harness().await;

        let result = poller.start().await;
        assert!(result.is_ok());
        tokio::time::sleep(Duration::from_millis(120)).await;
        poller.stop().await;

        assert!(store.sample_count().await > 0);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (_store, poller) = harness().await;

        let first = poller.start().await;
        assert!(first.is_ok());
        let second = poller.start().await;
        assert!(second.is_ok());
        assert!(poller.is_running().await);
        poller.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_final() {
        let (_store, poller) = harness().await;

        let result = poller.start().await;
        assert!(result.is_ok());
        poller.stop().await;
        poller.stop().await;
        assert!(!poller.is_running().await);
    }

    #[tokio::test]
    async fn stopped_harness_polls_nothing_further() {
        let (store, poller) = harness().await;

        let result = poller.start().await;
        assert!(result.is_ok());
        tokio::time::sleep(Duration::from_millis(60)).await;
        poller.stop().await;

        // Let already-dispatched work drain before taking the baseline.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = store.sample_count().await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.sample_count().await, settled);
    }
}
