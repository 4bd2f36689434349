//! Retention sweeping of uploaded samples.
//!
//! Only samples the collector has confirmed are ever deleted; pending
//! samples are kept regardless of age.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use geotrack_types::now_millis;

use crate::SharedStore;
use crate::error::Result;

/// Default age after which uploaded samples are swept.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default spacing between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Deletes uploaded samples older than the retention period.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: SharedStore,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(store: SharedStore, retention: Duration) -> Self {
        Self { store, retention }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Cutoff timestamp for a sweep run at `now_ms`.
    pub fn cutoff_for(&self, now_ms: i64) -> i64 {
        let retention_ms = i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(retention_ms)
    }

    /// Sweep as if the current time were `now_ms`. Returns the rows deleted.
    pub async fn sweep_at(&self, now_ms: i64) -> Result<usize> {
        let cutoff = self.cutoff_for(now_ms);
        let deleted = self.store.lock().await.delete_uploaded_older_than(cutoff)?;
        if deleted > 0 {
            info!("Swept {} uploaded samples older than {}", deleted, cutoff);
        } else {
            debug!("Retention sweep found nothing older than {}", cutoff);
        }
        Ok(deleted)
    }

    /// Sweep using the wall clock.
    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(now_millis()).await
    }
}

/// Limits sweeps to one per interval.
///
/// The first check always passes, so a freshly started session sweeps on its
/// first tick.
#[derive(Debug, Clone)]
pub struct SweepGate {
    every: Duration,
    last: Option<Instant>,
}

impl SweepGate {
    pub fn new(every: Duration) -> Self {
        Self { every, last: None }
    }

    /// Whether a sweep is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.every,
        }
    }

    /// Record that a sweep ran at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Check and record in one step.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        let due = self.is_due(now);
        if due {
            self.record(now);
        }
        due
    }
}
