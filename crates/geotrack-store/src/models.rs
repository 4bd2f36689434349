//! Data models for stored samples.

use serde::{Deserialize, Serialize};

use geotrack_types::{DeviceId, RawFix, UploadRecord};

/// A position sample ready to be appended to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    /// Installation identifier.
    pub device_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: Option<f32>,
    /// Altitude in meters.
    pub altitude: Option<f64>,
    /// Speed in m/s.
    pub speed: Option<f32>,
    /// Bearing in degrees.
    pub bearing: Option<f32>,
    /// Fix source.
    pub provider: String,
    /// When the fix was taken (epoch millis).
    pub fix_timestamp: i64,
}

impl NewSample {
    /// Create a NewSample from a raw fix.
    ///
    /// Optional fields are carried over only when the fix has them; a missing
    /// provider becomes `"unknown"`.
    pub fn from_fix(device_id: &DeviceId, fix: &RawFix) -> Self {
        Self {
            device_id: device_id.to_string(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            altitude: fix.altitude,
            speed: fix.speed,
            bearing: fix.bearing,
            provider: fix.provider_or_unknown().to_string(),
            fix_timestamp: fix.timestamp_ms,
        }
    }
}

/// A sample stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Database row ID, strictly increasing.
    pub id: i64,
    /// Installation identifier.
    pub device_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: Option<f32>,
    /// Altitude in meters.
    pub altitude: Option<f64>,
    /// Speed in m/s.
    pub speed: Option<f32>,
    /// Bearing in degrees.
    pub bearing: Option<f32>,
    /// Fix source.
    pub provider: String,
    /// When the fix was taken (epoch millis).
    pub fix_timestamp: i64,
    /// When the row was inserted (epoch millis).
    pub created_at: i64,
    /// Whether the collector has confirmed this sample.
    pub uploaded: bool,
}

impl Sample {
    /// Convert to the collector's upload record.
    pub fn to_upload_record(&self) -> UploadRecord {
        UploadRecord {
            device_id: self.device_id.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            altitude: self.altitude,
            speed: self.speed,
            bearing: self.bearing,
            provider: self.provider.clone(),
            location_timestamp: self.fix_timestamp,
        }
    }

    /// The payload portion of this sample, without store-assigned fields.
    pub fn payload(&self) -> NewSample {
        NewSample {
            device_id: self.device_id.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            altitude: self.altitude,
            speed: self.speed,
            bearing: self.bearing,
            provider: self.provider.clone(),
            fix_timestamp: self.fix_timestamp,
        }
    }
}
