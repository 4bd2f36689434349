//! Wire format shared with the remote collector.
//!
//! Every collector response is wrapped in an [`Envelope`] whose
//! `statusCode` is a business status, independent of the HTTP status.
//! Only `statusCode == 200` means the request was accepted.

use serde::{Deserialize, Serialize};

/// Envelope status code signalling success.
pub const STATUS_CODE_SUCCESS: i32 = 200;

/// Envelope status code the collector uses for generic failures.
pub const STATUS_CODE_FAIL: i32 = 501;

/// One sample as submitted to the upload endpoint.
///
/// The record carries no sample id, so the collector cannot deduplicate
/// a retried submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f32>,
    pub provider: String,
    /// When the fix was taken, epoch milliseconds.
    pub location_timestamp: i64,
}

/// Response wrapper returned by every collector endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub status_code: i32,
    #[serde(default)]
    pub op_desc: String,
    #[serde(default)]
    pub op_code: i32,
    #[serde(default)]
    pub business_code: String,
    #[serde(default)]
    pub local_time: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Whether the collector accepted the request.
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_CODE_SUCCESS
    }

    /// Build a success envelope, mostly useful for tests and fixtures.
    pub fn success(data: Option<T>, op_desc: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_CODE_SUCCESS,
            op_desc: op_desc.into(),
            op_code: 0,
            business_code: "LOCATION_TRACKER".to_string(),
            local_time: String::new(),
            data,
        }
    }

    /// Build a failure envelope.
    pub fn fail(status_code: i32, op_desc: impl Into<String>) -> Self {
        Self {
            status_code,
            op_desc: op_desc.into(),
            op_code: 1,
            business_code: "LOCATION_TRACKER".to_string(),
            local_time: String::new(),
            data: None,
        }
    }
}

/// A location row as reported by the collector's listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLocation {
    #[serde(default)]
    pub tid: Option<i64>,
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub location_timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_record_omits_missing_optionals() {
        let record = UploadRecord {
            device_id: "device_0badf00d".to_string(),
            latitude: 31.2304,
            longitude: 121.4737,
            accuracy: Some(8.0),
            altitude: None,
            speed: None,
            bearing: None,
            provider: "fused".to_string(),
            location_timestamp: 1_754_800_000_000,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["deviceId"], "device_0badf00d");
        assert_eq!(json["locationTimestamp"], 1_754_800_000_000i64);
        assert_eq!(json["accuracy"], 8.0);
        assert!(json.get("altitude").is_none());
        assert!(json.get("bearing").is_none());
    }

    #[test]
    fn test_envelope_success_criterion() {
        let body = r#"{"statusCode":200,"opDesc":"ok","opCode":0,
            "businessCode":"LOCATION_TRACKER","localTime":"2025-08-10 12:00:00","data":null}"#;
        let env: Envelope<()> = serde_json::from_str(body).unwrap();
        assert!(env.is_success());
        assert!(env.data.is_none());

        let body = r#"{"statusCode":501,"opDesc":"bad payload","opCode":1,
            "businessCode":"LOCATION_TRACKER","localTime":"2025-08-10 12:00:00"}"#;
        let env: Envelope<()> = serde_json::from_str(body).unwrap();
        assert!(!env.is_success());
        assert_eq!(env.op_desc, "bad payload");
    }

    #[test]
    fn test_envelope_with_string_data() {
        let body = r#"{"statusCode":200,"opDesc":"running","opCode":0,
            "businessCode":"LOCATION_TRACKER","localTime":"","data":"OK"}"#;
        let env: Envelope<String> = serde_json::from_str(body).unwrap();
        assert_eq!(env.data.as_deref(), Some("OK"));
    }

    #[test]
    fn test_remote_location_ignores_unknown_fields() {
        let body = r#"{"tid":7,"deviceId":"d","latitude":1.0,"longitude":2.0,
            "provider":"gps","locationTimestamp":10,"createTime":1754800000000}"#;
        let loc: RemoteLocation = serde_json::from_str(body).unwrap();
        assert_eq!(loc.tid, Some(7));
        assert_eq!(loc.provider.as_deref(), Some("gps"));
    }
}
