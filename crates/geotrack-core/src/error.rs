//! Error types for geotrack-core.
//!
//! # Propagation policy
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | [`Error::Permission`] | starting ingestion | ingestion stays idle; the caller must obtain the grant |
//! | [`Error::SourceUnavailable`] | ingestion stream | ends the ingestion loop, visible on session state |
//! | [`Error::Storage`] | one append | that sample is dropped and logged, the loop continues |
//! | [`Error::Storage`] | listing or sweeping | reported for the cycle, the schedule continues |
//!
//! Per-item upload failures are not errors at all: they are
//! [`SubmitOutcome`](crate::SubmitOutcome) values and only cause a retry on
//! the next cycle.

use thiserror::Error;

/// Errors that can occur in the ingestion and sync pipeline.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The positioning capability has not been granted.
    #[error("Location permission missing: {0}")]
    Permission(String),

    /// The positioning capability went away while streaming.
    #[error("Position source unavailable: {0}")]
    SourceUnavailable(String),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] geotrack_store::Error),

    /// Collector request failed.
    #[cfg(feature = "collector-client")]
    #[error(transparent)]
    Http(#[from] crate::client::ClientError),

    /// The ingestion loop is already running.
    #[error("Ingestion already running")]
    AlreadyRunning,

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }

    /// Create a source-unavailable error.
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using geotrack-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::permission("fine location not granted");
        assert_eq!(
            err.to_string(),
            "Location permission missing: fine location not granted"
        );

        let err = Error::source_unavailable("provider disabled");
        assert!(err.to_string().contains("provider disabled"));

        let err = Error::AlreadyRunning;
        assert_eq!(err.to_string(), "Ingestion already running");
    }

    #[test]
    fn test_storage_error_conversion() {
        let io_err = std::io::Error::other("disk full");
        let err: Error = geotrack_store::Error::from(io_err).into();
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
