//! Tracking session runner for geotrack.
//!
//! This crate provides:
//! - [`Config`]: TOML configuration with validation
//! - [`Session`]: one tracking session wiring a position source, the sample
//!   store and the collector together
//! - [`SessionState`]/[`SessionStatus`]: what the session has done so far
//!
//! # Configuration
//!
//! The `geotrack` binary reads `~/.config/geotrack/geotrack.toml`:
//!
//! ```toml
//! [tracking]
//! location_interval_ms = 30000
//! min_displacement_meters = 5.0
//!
//! [upload]
//! remote_base_url = "https://collector.example.com"
//! upload_interval_ms = 50000
//!
//! [retention]
//! retention_days = 7
//!
//! [source]
//! replay_path = "/path/to/trace.jsonl"
//! ```

pub mod config;
pub mod session;
pub mod state;

pub use config::{Config, ConfigError, ValidationError, default_config_path};
pub use session::{Session, SessionSettings};
pub use state::{SessionState, SessionStatus};
