//! Core position types.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Provider name recorded when a fix does not say where it came from.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// A raw position reading delivered by a positioning capability.
///
/// Optional fields are `Some` only when the source marks them as present.
/// Latitude and longitude are trusted to be in range; nothing downstream
/// re-validates them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RawFix {
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub accuracy: Option<f32>,
    /// Altitude above the WGS84 ellipsoid in meters.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub altitude: Option<f64>,
    /// Ground speed in meters per second.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub speed: Option<f32>,
    /// Bearing in degrees clockwise from true north.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub bearing: Option<f32>,
    /// Name of the fix source (e.g. `gps`, `network`, `fused`).
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub provider: Option<String>,
    /// When the fix was taken, epoch milliseconds.
    pub timestamp_ms: i64,
}

impl RawFix {
    /// Create a fix with only the required fields set.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            speed: None,
            bearing: None,
            provider: None,
            timestamp_ms,
        }
    }

    /// Create a builder for a fix at the given coordinates.
    pub fn builder(latitude: f64, longitude: f64) -> RawFixBuilder {
        RawFixBuilder {
            fix: Self::new(latitude, longitude, now_millis()),
        }
    }

    /// Provider name, falling back to [`UNKNOWN_PROVIDER`].
    pub fn provider_or_unknown(&self) -> &str {
        self.provider.as_deref().unwrap_or(UNKNOWN_PROVIDER)
    }

    /// Great-circle distance to another fix in meters.
    pub fn distance_to(&self, other: &RawFix) -> f64 {
        crate::geo::haversine_meters(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Builder for [`RawFix`].
#[derive(Debug)]
#[must_use]
pub struct RawFixBuilder {
    fix: RawFix,
}

impl RawFixBuilder {
    /// Set the accuracy radius.
    pub fn accuracy(mut self, accuracy: f32) -> Self {
        self.fix.accuracy = Some(accuracy);
        self
    }

    /// Set the altitude.
    pub fn altitude(mut self, altitude: f64) -> Self {
        self.fix.altitude = Some(altitude);
        self
    }

    /// Set the speed.
    pub fn speed(mut self, speed: f32) -> Self {
        self.fix.speed = Some(speed);
        self
    }

    /// Set the bearing.
    pub fn bearing(mut self, bearing: f32) -> Self {
        self.fix.bearing = Some(bearing);
        self
    }

    /// Set the provider name.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.fix.provider = Some(provider.into());
        self
    }

    /// Set the fix timestamp (epoch milliseconds).
    pub fn timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.fix.timestamp_ms = timestamp_ms;
        self
    }

    /// Build the fix without range checks.
    pub fn build(self) -> RawFix {
        self.fix
    }

    /// Build the fix, rejecting coordinates outside their valid ranges.
    pub fn try_build(self) -> Result<RawFix, ParseError> {
        let fix = self.fix;
        if !(-90.0..=90.0).contains(&fix.latitude) {
            return Err(ParseError::OutOfRange {
                field: "latitude",
                value: fix.latitude,
            });
        }
        if !(-180.0..=180.0).contains(&fix.longitude) {
            return Err(ParseError::OutOfRange {
                field: "longitude",
                value: fix.longitude,
            });
        }
        Ok(fix)
    }
}

/// Stable identifier of this installation.
///
/// Generated once and persisted outside the sample store; attached to every
/// sample as a foreign attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap an identifier, rejecting blank strings.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ParseError::InvalidValue("device id cannot be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Counts over the local sample cache, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CacheStats {
    /// All samples currently stored.
    pub total: u64,
    /// Samples still waiting for a confirmed upload.
    pub unuploaded: u64,
}

impl CacheStats {
    /// Build stats from the two stored counts.
    pub fn new(total: u64, unuploaded: u64) -> Self {
        Self { total, unuploaded }
    }

    /// Samples already confirmed by the collector.
    pub fn uploaded(&self) -> u64 {
        self.total.saturating_sub(self.unuploaded)
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} total, {} pending, {} uploaded",
            self.total,
            self.unuploaded,
            self.uploaded()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_optional_fields() {
        let fix = RawFix::builder(31.23, 121.47)
            .accuracy(4.5)
            .altitude(12.0)
            .provider("gps")
            .timestamp_ms(1_700_000_000_000)
            .build();

        assert_eq!(fix.accuracy, Some(4.5));
        assert_eq!(fix.altitude, Some(12.0));
        assert_eq!(fix.speed, None);
        assert_eq!(fix.bearing, None);
        assert_eq!(fix.provider_or_unknown(), "gps");
        assert_eq!(fix.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_provider_falls_back_to_unknown() {
        let fix = RawFix::new(0.0, 0.0, 0);
        assert_eq!(fix.provider_or_unknown(), UNKNOWN_PROVIDER);
    }

    #[test]
    fn test_try_build_rejects_out_of_range() {
        let err = RawFix::builder(91.0, 0.0).try_build().unwrap_err();
        assert!(err.to_string().contains("latitude"));

        let err = RawFix::builder(0.0, -180.5).try_build().unwrap_err();
        assert!(err.to_string().contains("longitude"));

        assert!(RawFix::builder(-90.0, 180.0).try_build().is_ok());
    }

    #[test]
    fn test_device_id_rejects_blank() {
        assert!(DeviceId::new("   ").is_err());
        let id: DeviceId = " device_1a2b3c4d ".parse().unwrap();
        assert_eq!(id.as_str(), "device_1a2b3c4d");
    }

    #[test]
    fn test_cache_stats_uploaded() {
        let stats = CacheStats::new(10, 3);
        assert_eq!(stats.uploaded(), 7);
        assert_eq!(stats.to_string(), "10 total, 3 pending, 7 uploaded");
    }

    #[test]
    fn test_raw_fix_json_uses_camel_case() {
        let fix = RawFix::builder(1.0, 2.0).timestamp_ms(5).speed(1.5).build();
        let json = serde_json::to_value(&fix).unwrap();
        assert_eq!(json["timestampMs"], 5);
        assert_eq!(json["speed"], 1.5);
        assert!(json.get("bearing").is_none());

        let back: RawFix = serde_json::from_value(json).unwrap();
        assert_eq!(back, fix);
    }
}
