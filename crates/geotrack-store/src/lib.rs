//! Durable local queue of position samples.
//!
//! This crate provides SQLite-based storage for position samples, so every
//! fix is on disk before any network activity and survives indefinite
//! network absence.
//!
//! # Features
//!
//! - Append samples with store-assigned ids and creation times
//! - List unuploaded samples oldest first (the upload order)
//! - Flag samples as uploaded, idempotently
//! - Delete uploaded samples past a retention cutoff
//! - Change notifications for live listings
//! - Persistent device identity ([`identity`])
//!
//! # Example
//!
//! ```no_run
//! use geotrack_store::{NewSample, Store};
//!
//! let store = Store::open_default()?;
//! let pending = store.list_unuploaded()?;
//! println!("{} samples waiting for upload", pending.len());
//! # Ok::<(), geotrack_store::Error>(())
//! ```

mod error;
pub mod identity;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use identity::{DeviceIdStore, FileDeviceIdStore, MemoryDeviceIdStore};
pub use models::{NewSample, Sample};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/geotrack/samples.db`
/// - macOS: `~/Library/Application Support/geotrack/samples.db`
/// - Windows: `C:\Users\<user>\AppData\Local\geotrack\samples.db`
pub fn default_db_path() -> std::path::PathBuf {
    data_dir().join("samples.db")
}

/// Default location of the persisted device id.
pub fn default_device_id_path() -> std::path::PathBuf {
    data_dir().join("device_id")
}

fn data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("geotrack")
}
