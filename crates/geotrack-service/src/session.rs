//! Tracking session orchestration.
//!
//! A [`Session`] ties one position source, one sample store and one collector
//! together for as long as tracking is on:
//!
//! - the ingestion loop appends every accepted fix,
//! - a tick task runs an upload cycle every `upload_interval`, with the
//!   retention sweep folded into the same tick at most once per
//!   `sweep_every`.
//!
//! Stopping cancels both through one token. The store is left as is, so a
//! new session over the same store and device id picks up where this one
//! left off.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use geotrack_core::{
    CollectorClient, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL, Error, IngestionLoop,
    IngestionReport, IngestionState, PositionSource, Result, RetentionSweeper, SharedStore,
    SourceOptions, SweepGate, SyncEngine, UploadTarget,
};
use geotrack_types::{CacheStats, DeviceId};

use crate::state::{SessionState, SessionStatus, upload_message};

/// Timing for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Options passed to the position source.
    pub source: SourceOptions,
    /// Spacing between upload cycles. The first cycle runs one full interval
    /// after start.
    pub upload_interval: Duration,
    /// Age after which uploaded samples are swept.
    pub retention: Duration,
    /// Minimum spacing between sweeps.
    pub sweep_every: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            source: SourceOptions::default(),
            upload_interval: Duration::from_millis(50_000),
            retention: DEFAULT_RETENTION,
            sweep_every: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

struct Running {
    cancel: CancellationToken,
    ingestion: JoinHandle<IngestionReport>,
}

/// One tracking session.
pub struct Session {
    store: SharedStore,
    device_id: DeviceId,
    ingestion: IngestionLoop,
    sync: Arc<SyncEngine>,
    sweeper: RetentionSweeper,
    collector: Option<CollectorClient>,
    settings: SessionSettings,
    state: Arc<SessionState>,
    running: Mutex<Option<Running>>,
}

impl Session {
    /// Create a session uploading to an arbitrary target.
    pub fn new(
        store: SharedStore,
        device_id: DeviceId,
        source: Arc<dyn PositionSource>,
        target: Arc<dyn UploadTarget>,
        settings: SessionSettings,
    ) -> Self {
        let ingestion = IngestionLoop::new(
            source,
            Arc::clone(&store),
            device_id.clone(),
            settings.source.clone(),
        );
        let sync = Arc::new(SyncEngine::new(Arc::clone(&store), target));
        let sweeper = RetentionSweeper::new(Arc::clone(&store), settings.retention);

        Self {
            store,
            device_id,
            ingestion,
            sync,
            sweeper,
            collector: None,
            settings,
            state: Arc::new(SessionState::new()),
            running: Mutex::new(None),
        }
    }

    /// Create a session uploading to a collector, which also serves health
    /// checks.
    pub fn with_collector(
        store: SharedStore,
        device_id: DeviceId,
        source: Arc<dyn PositionSource>,
        collector: CollectorClient,
        settings: SessionSettings,
    ) -> Self {
        let target: Arc<dyn UploadTarget> = Arc::new(collector.clone());
        let mut session = Self::new(store, device_id, source, target, settings);
        session.collector = Some(collector);
        session
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Shared bookkeeping, for display surfaces.
    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    /// Current ingestion state.
    pub fn ingestion_state(&self) -> IngestionState {
        self.ingestion.state()
    }

    /// Start ingestion and the upload schedule.
    ///
    /// Fails with [`Error::Permission`] when the source has no grant; nothing
    /// is started in that case.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let handle = self.ingestion.start(cancel.clone()).await?;

        let state = Arc::clone(&self.state);
        let ingestion = tokio::spawn(async move {
            let report = handle.join().await;
            if let geotrack_core::IngestionExit::SourceUnavailable(reason) = &report.exit {
                state
                    .record_error(format!("position source unavailable: {reason}"))
                    .await;
            }
            state.set_last_ingestion(report.clone()).await;
            report
        });

        tokio::spawn(run_ticks(
            Arc::clone(&self.sync),
            self.sweeper.clone(),
            SweepGate::new(self.settings.sweep_every),
            Instant::now() + self.settings.upload_interval,
            self.settings.upload_interval,
            Arc::clone(&self.state),
            cancel.clone(),
        ));

        self.state.set_running(true);
        info!(
            "Session started for {} (upload every {:?})",
            self.device_id, self.settings.upload_interval
        );

        *running = Some(Running { cancel, ingestion });
        Ok(())
    }

    /// Stop ingestion and the upload schedule.
    ///
    /// Returns the ingestion report, or `None` if the session was not running.
    /// An upload cycle already in flight is allowed to finish.
    pub async fn stop(&self) -> Option<IngestionReport> {
        let running = self.running.lock().await.take()?;
        running.cancel.cancel();

        let report = match running.ingestion.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Ingestion watcher failed: {}", e);
                None
            }
        };

        self.state.set_running(false);
        info!("Session stopped for {}", self.device_id);
        report
    }

    /// Whether the session has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Run one upload cycle now and return a short status line.
    pub async fn upload_now(&self) -> String {
        let message = match self.sync.run_cycle().await {
            Ok(report) => {
                self.state.record_cycle(&report).await;
                upload_message(&report)
            }
            Err(e) => {
                let message = format!("upload failed: {e}");
                self.state.record_error(message.clone()).await;
                message
            }
        };
        self.state.set_last_upload(message.clone()).await;
        message
    }

    /// Ask the collector whether it is up and return a short status line.
    pub async fn health_check(&self) -> String {
        let message = match &self.collector {
            Some(collector) => match collector.health().await {
                Ok(data) => format!("server ok: {data}"),
                Err(e) => format!("health check failed: {e}"),
            },
            None => "health check failed: no collector configured".to_string(),
        };
        self.state.set_last_health(message.clone()).await;
        message
    }

    /// Sample counts from the store.
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.store.lock().await.cache_stats()?)
    }

    /// Point-in-time view of the session.
    pub async fn status(&self) -> SessionStatus {
        self.state.snapshot(self.ingestion.state()).await
    }
}

async fn run_ticks(
    sync: Arc<SyncEngine>,
    sweeper: RetentionSweeper,
    mut gate: SweepGate,
    first_tick: Instant,
    period: Duration,
    state: Arc<SessionState>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Upload schedule cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }

        match sync.run_cycle().await {
            Ok(report) => state.record_cycle(&report).await,
            Err(e) => {
                error!("Upload cycle failed: {}", e);
                state.record_error(format!("upload failed: {e}")).await;
            }
        }

        if gate.try_pass(Instant::now()) {
            match sweeper.sweep().await {
                Ok(deleted) => state.record_sweep(deleted),
                Err(e) => {
                    warn!("Retention sweep failed: {}", e);
                    state.record_error(format!("sweep failed: {e}")).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geotrack_core::{MockPositionSource, SubmitOutcome, shared};
    use geotrack_store::Store;
    use geotrack_types::UploadRecord;

    struct Accept;

    #[async_trait::async_trait]
    impl UploadTarget for Accept {
        async fn submit(&self, _record: &UploadRecord) -> SubmitOutcome {
            SubmitOutcome::Success
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wins_over_due_tick() {
        let store = shared(Store::open_in_memory().unwrap());
        let state = Arc::new(SessionState::new());
        let sync = Arc::new(SyncEngine::new(Arc::clone(&store), Arc::new(Accept)));
        let sweeper = RetentionSweeper::new(store, DEFAULT_RETENTION);

        let cancel = CancellationToken::new();
        cancel.cancel();

        // Both branches are ready on every first poll.
        for _ in 0..32 {
            run_ticks(
                Arc::clone(&sync),
                sweeper.clone(),
                SweepGate::new(DEFAULT_SWEEP_INTERVAL),
                Instant::now(),
                Duration::from_secs(50),
                Arc::clone(&state),
                cancel.clone(),
            )
            .await;
        }
        assert_eq!(state.snapshot(IngestionState::Idle).await.cycles, 0);
    }

    fn session(source: Arc<MockPositionSource>) -> Session {
        Session::new(
            shared(Store::open_in_memory().unwrap()),
            DeviceId::new("device_sess0001").unwrap(),
            source,
            Arc::new(Accept),
            SessionSettings::default(),
        )
    }

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.upload_interval, Duration::from_secs(50));
        assert_eq!(settings.retention, Duration::from_secs(7 * 86_400));
        assert_eq!(settings.sweep_every, Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_start_without_permission() {
        let source = Arc::new(MockPositionSource::new().without_permission());
        let session = session(source.clone());

        assert!(matches!(session.start().await, Err(Error::Permission(_))));
        assert!(!session.is_running());
        assert_eq!(session.ingestion_state(), IngestionState::Idle);
        assert!(session.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let source = Arc::new(MockPositionSource::new().hold_open());
        let session = session(source.clone());

        session.start().await.unwrap();
        assert!(matches!(session.start().await, Err(Error::AlreadyRunning)));
        assert!(session.stop().await.is_some());
        assert_eq!(source.open_count(), 1);
        assert_eq!(source.close_count(), 1);
    }

    #[tokio::test]
    async fn test_health_without_collector() {
        let session = session(Arc::new(MockPositionSource::new()));
        let message = session.health_check().await;
        assert!(message.starts_with("health check failed"));
        assert_eq!(session.status().await.last_health, Some(message));
    }
}
