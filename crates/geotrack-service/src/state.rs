//! Observable state of a tracking session.
//!
//! [`SessionState`] is shared between the session, its tick task and any
//! display surface. Everything in it is a record of what already happened;
//! losing it loses nothing that the sample store does not also hold.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use geotrack_core::{IngestionReport, IngestionState, SyncReport};

/// Shared, mutable session bookkeeping.
pub struct SessionState {
    running: AtomicBool,
    /// Unix timestamp of the last start, 0 when never started.
    started_at: AtomicU64,
    cycles: AtomicU64,
    uploaded: AtomicU64,
    swept: AtomicU64,
    messages: RwLock<Messages>,
}

#[derive(Debug, Default, Clone)]
struct Messages {
    last_upload: Option<String>,
    last_health: Option<String>,
    last_error: Option<String>,
    last_ingestion: Option<IngestionReport>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            uploaded: AtomicU64::new(0),
            swept: AtomicU64::new(0),
            messages: RwLock::new(Messages::default()),
        }
    }

    /// Check if the session is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the session as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// When the session was last started.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// Record a completed sync cycle.
    pub async fn record_cycle(&self, report: &SyncReport) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        self.uploaded
            .fetch_add(report.succeeded as u64, Ordering::SeqCst);
        self.messages.write().await.last_upload = Some(upload_message(report));
    }

    /// Record a completed retention sweep.
    pub fn record_sweep(&self, deleted: usize) {
        self.swept.fetch_add(deleted as u64, Ordering::SeqCst);
    }

    /// Record an aggregate failure.
    pub async fn record_error(&self, message: impl Into<String>) {
        self.messages.write().await.last_error = Some(message.into());
    }

    pub async fn set_last_upload(&self, message: impl Into<String>) {
        self.messages.write().await.last_upload = Some(message.into());
    }

    pub async fn set_last_health(&self, message: impl Into<String>) {
        self.messages.write().await.last_health = Some(message.into());
    }

    pub async fn set_last_ingestion(&self, report: IngestionReport) {
        self.messages.write().await.last_ingestion = Some(report);
    }

    /// Build a serializable snapshot.
    pub async fn snapshot(&self, ingestion: IngestionState) -> SessionStatus {
        let messages = self.messages.read().await.clone();
        SessionStatus {
            running: self.is_running(),
            ingestion,
            started_at: self.started_at(),
            cycles: self.cycles.load(Ordering::SeqCst),
            uploaded_total: self.uploaded.load(Ordering::SeqCst),
            swept_total: self.swept.load(Ordering::SeqCst),
            last_upload: messages.last_upload,
            last_health: messages.last_health,
            last_error: messages.last_error,
            last_ingestion: messages.last_ingestion,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Whether the session has been started and not stopped.
    pub running: bool,
    /// Whether fixes are currently being ingested.
    pub ingestion: IngestionState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Completed sync cycles since the state was created.
    pub cycles: u64,
    pub uploaded_total: u64,
    pub swept_total: u64,
    pub last_upload: Option<String>,
    pub last_health: Option<String>,
    pub last_error: Option<String>,
    /// Report of the last ingestion run that ended.
    pub last_ingestion: Option<IngestionReport>,
}

/// Short human-readable summary of a sync cycle.
pub fn upload_message(report: &SyncReport) -> String {
    format!("uploaded {} sample(s)", report.succeeded)
}
