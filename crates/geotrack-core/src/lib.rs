//! Offline-first position ingestion and sync pipeline.
//!
//! This crate moves position fixes from a positioning capability into the
//! local sample store, and from the store to a remote collector:
//!
//! - [`PositionSource`] abstracts the positioning capability, with a
//!   [`Subscription`] guard that always releases it
//! - [`IngestionLoop`] appends every accepted fix to the store
//! - [`SyncEngine`] uploads pending samples and flags the confirmed ones
//! - [`RetentionSweeper`] deletes uploaded samples past their retention
//! - [`SampleFeed`] follows the store for display
//!
//! The store is the single source of truth. A fix is on disk before any
//! network activity, and a sample is only flagged after the collector
//! confirmed it, so nothing is lost while the network is absent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use geotrack_core::{CollectorClient, SyncEngine, shared};
//! use geotrack_store::Store;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = shared(Store::open_default()?);
//! let client = Arc::new(CollectorClient::new("https://collector.example.com")?);
//! let report = SyncEngine::new(store, client).run_cycle().await?;
//! println!("{} of {} uploaded", report.succeeded, report.attempted);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;

use geotrack_store::Store;

#[cfg(feature = "collector-client")]
pub mod client;
pub mod error;
pub mod feed;
pub mod filter;
pub mod ingest;
pub mod mock;
pub mod replay;
pub mod retention;
pub mod source;
pub mod sync;

#[cfg(feature = "collector-client")]
pub use client::{ClientError, CollectorClient, Timeouts};
pub use error::{Error, Result};
pub use feed::SampleFeed;
pub use filter::DisplacementFilter;
pub use ingest::{IngestionExit, IngestionHandle, IngestionLoop, IngestionReport, IngestionState};
pub use mock::MockPositionSource;
pub use replay::ReplaySource;
pub use retention::{DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL, RetentionSweeper, SweepGate};
pub use source::{FixStream, PositionSource, SourceOptions, Subscription, subscribe};
pub use sync::{SubmitOutcome, SyncEngine, SyncReport, UploadTarget};

// Re-export the building blocks so callers need a single dependency.
pub use geotrack_store;
pub use geotrack_types;

/// The sample store shared between ingestion, sync and sweeping.
///
/// Each operation takes the lock for one store call only.
pub type SharedStore = Arc<Mutex<Store>>;

/// Wrap a store for sharing.
pub fn shared(store: Store) -> SharedStore {
    Arc::new(Mutex::new(store))
}
