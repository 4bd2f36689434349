//! Error types for value parsing in geotrack-types.

use thiserror::Error;

/// Errors that can occur when constructing geotrack values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A value was rejected.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A coordinate fell outside its valid range.
    #[error("{field} {value} is out of range")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Result type alias using geotrack-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
