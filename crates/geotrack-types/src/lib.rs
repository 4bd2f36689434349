//! Platform-agnostic types for offline position tracking.
//!
//! This crate provides the values shared by the sample store
//! (`geotrack-store`), the ingestion and sync pipeline (`geotrack-core`),
//! and the remote collector's wire format.
//!
//! # Features
//!
//! - [`RawFix`]: a reading from a positioning capability
//! - [`DeviceId`]: the stable installation identifier
//! - [`CacheStats`]: derived counts over the local cache
//! - [`wire`]: upload records and response envelopes (requires `serde`)
//!
//! # Example
//!
//! ```
//! use geotrack_types::RawFix;
//!
//! let fix = RawFix::builder(31.2304, 121.4737)
//!     .accuracy(6.0)
//!     .provider("gps")
//!     .build();
//! assert_eq!(fix.provider_or_unknown(), "gps");
//! ```

pub mod error;
pub mod geo;
pub mod types;
#[cfg(feature = "serde")]
pub mod wire;

pub use error::{ParseError, ParseResult};
pub use types::{CacheStats, DeviceId, RawFix, RawFixBuilder, UNKNOWN_PROVIDER, now_millis};
#[cfg(feature = "serde")]
pub use wire::{Envelope, RemoteLocation, UploadRecord};
