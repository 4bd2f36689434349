//! Sync engine: push pending samples to the collector.
//!
//! One cycle reads every unuploaded sample, submits each one individually
//! and then flags the confirmed ones in a single store update. Samples that
//! were rejected or hit a transport failure stay pending and are submitted
//! again on the next cycle; there is no backoff and no retry cap.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use geotrack_types::UploadRecord;

use crate::SharedStore;
use crate::error::Result;

/// Result of submitting a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The collector confirmed the record.
    Success,
    /// The collector answered but did not accept the record.
    Rejected {
        /// Envelope status code, if a decodable envelope came back.
        status_code: Option<i32>,
        description: String,
    },
    /// The request never produced an answer (timeout, refused, non-2xx).
    TransportFailure(String),
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Somewhere upload records can be submitted to.
#[async_trait]
pub trait UploadTarget: Send + Sync {
    /// Submit one record. Never fails; every problem is an outcome.
    async fn submit(&self, record: &UploadRecord) -> SubmitOutcome;
}

/// Counters for one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Samples that were pending at the start of the cycle.
    pub attempted: usize,
    /// Samples the target confirmed.
    pub succeeded: usize,
    pub rejected: usize,
    pub transport_failures: usize,
}

impl SyncReport {
    /// Samples left pending by this cycle.
    pub fn failed(&self) -> usize {
        self.rejected + self.transport_failures
    }
}

/// Drives upload cycles against an [`UploadTarget`].
pub struct SyncEngine {
    store: SharedStore,
    target: Arc<dyn UploadTarget>,
    /// Held for the whole of a cycle.
    cycle: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: SharedStore, target: Arc<dyn UploadTarget>) -> Self {
        Self {
            store,
            target,
            cycle: Mutex::new(()),
        }
    }

    /// Run one upload cycle.
    ///
    /// A call made while another cycle is running waits for it and then
    /// reads the pending set afresh. Fails only if the store cannot be read
    /// or updated. The store lock is not held while records are in flight.
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        let _cycle = self.cycle.lock().await;
        let pending = self.store.lock().await.list_unuploaded()?;
        let mut report = SyncReport {
            attempted: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            debug!("No pending samples to upload");
            return Ok(report);
        }

        info!("Uploading {} pending samples", pending.len());
        let mut confirmed = Vec::with_capacity(pending.len());

        for sample in &pending {
            match self.target.submit(&sample.to_upload_record()).await {
                SubmitOutcome::Success => confirmed.push(sample.id),
                SubmitOutcome::Rejected {
                    status_code,
                    description,
                } => {
                    report.rejected += 1;
                    warn!(
                        "Sample {} rejected (status {:?}): {}",
                        sample.id, status_code, description
                    );
                }
                SubmitOutcome::TransportFailure(reason) => {
                    report.transport_failures += 1;
                    warn!("Sample {} not delivered: {}", sample.id, reason);
                }
            }
        }

        report.succeeded = confirmed.len();
        if !confirmed.is_empty() {
            let flipped = self.store.lock().await.mark_uploaded(&confirmed)?;
            debug!("Flagged {} of {} confirmed samples", flipped, confirmed.len());
        }

        info!(
            "Upload cycle done: {}/{} uploaded, {} rejected, {} transport failures",
            report.succeeded, report.attempted, report.rejected, report.transport_failures
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared;
    use geotrack_store::{NewSample, Store};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Accepting(AtomicUsize);

    #[async_trait]
    impl UploadTarget for Accepting {
        async fn submit(&self, _record: &UploadRecord) -> SubmitOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            SubmitOutcome::Success
        }
    }

    fn sample(n: i64) -> NewSample {
        NewSample {
            device_id: "device_sync".to_string(),
            latitude: 10.0,
            longitude: 20.0,
            accuracy: None,
            altitude: None,
            speed: None,
            bearing: None,
            provider: "gps".to_string(),
            fix_timestamp: n,
        }
    }

    #[tokio::test]
    async fn test_empty_store_makes_no_calls() {
        let store = shared(Store::open_in_memory().unwrap());
        let target = Arc::new(Accepting(AtomicUsize::new(0)));
        let engine = SyncEngine::new(store, target.clone());

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(target.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_accepted() {
        let store = shared(Store::open_in_memory().unwrap());
        for n in 0..3 {
            store.lock().await.append(&sample(n)).unwrap();
        }
        let target = Arc::new(Accepting(AtomicUsize::new(0)));
        let engine = SyncEngine::new(store.clone(), target.clone());

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed(), 0);
        assert_eq!(store.lock().await.count_unuploaded().unwrap(), 0);

        // Nothing left for the next cycle.
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(target.0.load(Ordering::SeqCst), 3);
    }

    struct Slow(AtomicUsize);

    #[async_trait]
    impl UploadTarget for Slow {
        async fn submit(&self, _record: &UploadRecord) -> SubmitOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            SubmitOutcome::Success
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycles_submit_once() {
        let store = shared(Store::open_in_memory().unwrap());
        for n in 0..3 {
            store.lock().await.append(&sample(n)).unwrap();
        }
        let target = Arc::new(Slow(AtomicUsize::new(0)));
        let engine = SyncEngine::new(store.clone(), target.clone());

        let (a, b) = tokio::join!(engine.run_cycle(), engine.run_cycle());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(target.0.load(Ordering::SeqCst), 3);
        for report in [a, b] {
            assert_eq!(
                report.succeeded + report.rejected + report.transport_failures,
                report.attempted
            );
        }
        assert_eq!(a.succeeded + b.succeeded, 3);
        assert_eq!(store.lock().await.count_unuploaded().unwrap(), 0);
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(SubmitOutcome::Success.is_success());
        assert!(!SubmitOutcome::TransportFailure("timeout".into()).is_success());
    }
}
