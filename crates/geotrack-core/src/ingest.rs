//! Ingestion loop: source fixes into the sample store.
//!
//! [`IngestionLoop::start`] opens the position source and spawns a task that
//! converts each accepted fix into a sample and appends it. A failed append
//! drops that one sample and the loop keeps going. The loop ends when it is
//! cancelled, when the source runs dry, or when the source reports it is
//! unavailable; in every case the source is released exactly once and the
//! published state returns to [`IngestionState::Idle`].

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use geotrack_store::NewSample;
use geotrack_types::DeviceId;

use crate::SharedStore;
use crate::error::{Error, Result};
use crate::filter::DisplacementFilter;
use crate::source::{PositionSource, SourceOptions, Subscription, subscribe};

/// Whether the ingestion loop is currently consuming fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionState {
    Idle,
    Running,
}

/// Why an ingestion run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum IngestionExit {
    /// Stopped through the cancellation token.
    Cancelled,
    /// The source ended its stream without an error.
    Exhausted,
    /// The source reported that it became unavailable.
    SourceUnavailable(String),
    /// The ingestion task panicked.
    Failed(String),
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// Samples appended to the store.
    pub stored: u64,
    /// Fixes lost because the append failed.
    pub dropped: u64,
    /// Fixes ignored by the displacement filter.
    pub filtered: u64,
    pub exit: IngestionExit,
}

impl IngestionReport {
    fn new() -> Self {
        Self {
            stored: 0,
            dropped: 0,
            filtered: 0,
            exit: IngestionExit::Exhausted,
        }
    }
}

/// Couples a position source to the sample store.
pub struct IngestionLoop {
    source: Arc<dyn PositionSource>,
    store: SharedStore,
    device_id: DeviceId,
    options: SourceOptions,
    state: Arc<watch::Sender<IngestionState>>,
}

impl IngestionLoop {
    /// Create an idle ingestion loop.
    pub fn new(
        source: Arc<dyn PositionSource>,
        store: SharedStore,
        device_id: DeviceId,
        options: SourceOptions,
    ) -> Self {
        let (state, _) = watch::channel(IngestionState::Idle);
        Self {
            source,
            store,
            device_id,
            options,
            state: Arc::new(state),
        }
    }

    /// Current state.
    pub fn state(&self) -> IngestionState {
        *self.state.borrow()
    }

    /// Receive every state transition.
    pub fn watch_state(&self) -> watch::Receiver<IngestionState> {
        self.state.subscribe()
    }

    /// The source this loop reads from.
    pub fn source(&self) -> &Arc<dyn PositionSource> {
        &self.source
    }

    /// Open the source and begin ingesting.
    ///
    /// Fails with [`Error::Permission`] if the grant is missing, in which case
    /// nothing is opened and the state stays idle. The loop stops when
    /// `cancel` (or the returned handle) is cancelled.
    pub async fn start(&self, cancel: CancellationToken) -> Result<IngestionHandle> {
        if self.state() == IngestionState::Running {
            return Err(Error::AlreadyRunning);
        }
        self.options.validate()?;

        let subscription = subscribe(Arc::clone(&self.source), &self.options).await?;
        if !self.source.has_background_permission() {
            warn!("Background location not granted; fixes stop when the app is backgrounded");
        }

        self.state.send_replace(IngestionState::Running);
        info!("Ingestion started for {}", self.device_id);

        let token = cancel.child_token();
        let task = tokio::spawn(run(
            subscription,
            Arc::clone(&self.store),
            self.device_id.clone(),
            DisplacementFilter::new(self.options.min_displacement_m),
            token.clone(),
            Arc::clone(&self.state),
        ));

        Ok(IngestionHandle { cancel: token, task })
    }
}

/// Handle to a running ingestion task.
#[derive(Debug)]
pub struct IngestionHandle {
    cancel: CancellationToken,
    task: JoinHandle<IngestionReport>,
}

impl IngestionHandle {
    /// Cancel the loop and wait for it to wind down.
    pub async fn stop(self) -> IngestionReport {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the loop to end on its own.
    pub async fn join(self) -> IngestionReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                warn!("Ingestion task failed: {}", e);
                IngestionReport {
                    exit: IngestionExit::Failed(e.to_string()),
                    ..IngestionReport::new()
                }
            }
        }
    }

    /// Whether the loop has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Token that cancels this loop only.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Sets the state back to idle when the task ends, panics included.
struct IdleOnDrop(Arc<watch::Sender<IngestionState>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(IngestionState::Idle);
    }
}

async fn run(
    subscription: Subscription,
    store: SharedStore,
    device_id: DeviceId,
    mut filter: DisplacementFilter,
    cancel: CancellationToken,
    state: Arc<watch::Sender<IngestionState>>,
) -> IngestionReport {
    // Declared first so it drops last: the source is released before the
    // state reads idle.
    let _idle = IdleOnDrop(state);
    let mut subscription = subscription;
    let mut report = IngestionReport::new();

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.exit = IngestionExit::Cancelled;
                break;
            }
            item = subscription.next() => item,
        };

        let fix = match item {
            None => {
                report.exit = IngestionExit::Exhausted;
                break;
            }
            Some(Err(e)) => {
                warn!("Position source failed: {}", e);
                report.exit = IngestionExit::SourceUnavailable(match e {
                    Error::SourceUnavailable(reason) => reason,
                    other => other.to_string(),
                });
                break;
            }
            Some(Ok(fix)) => fix,
        };

        if !filter.accept(&fix) {
            report.filtered += 1;
            continue;
        }

        let sample = NewSample::from_fix(&device_id, &fix);
        let appended = store.lock().await.append(&sample);
        match appended {
            Ok(id) => {
                report.stored += 1;
                debug!("Stored sample {} ({}, {})", id, fix.latitude, fix.longitude);
            }
            Err(e) => {
                report.dropped += 1;
                warn!("Failed to store fix: {}", e);
            }
        }
    }

    subscription.release();
    info!(
        "Ingestion ended ({:?}): {} stored, {} dropped, {} filtered",
        report.exit, report.stored, report.dropped, report.filtered
    );
    report
}
