//! Tracker configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use geotrack_core::{SourceOptions, Timeouts};

use crate::session::SessionSettings;

/// Minimum fix interval in milliseconds (1 second).
pub const MIN_LOCATION_INTERVAL_MS: u64 = 1_000;
/// Maximum fix interval in milliseconds (1 hour).
pub const MAX_LOCATION_INTERVAL_MS: u64 = 3_600_000;
/// Minimum upload interval in milliseconds (1 second).
pub const MIN_UPLOAD_INTERVAL_MS: u64 = 1_000;
/// Maximum upload interval in milliseconds (1 day).
pub const MAX_UPLOAD_INTERVAL_MS: u64 = 86_400_000;
/// Maximum network timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Tracker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fix acquisition settings.
    pub tracking: TrackingConfig,
    /// Collector and upload cadence.
    pub upload: UploadConfig,
    /// Local retention of uploaded samples.
    pub retention: RetentionConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Where fixes come from when not attached to a live receiver.
    pub source: SourceConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Intervals are positive and within bounds
    /// - The collector URL uses http or https
    /// - Retention is at least one day
    /// - The displacement threshold is finite and not negative
    /// - Storage paths are not empty
    ///
    /// # Example
    ///
    /// ```
    /// use geotrack_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.tracking.validate());
        errors.extend(self.upload.validate());
        errors.extend(self.retention.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.source.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Options handed to the position source.
    pub fn source_options(&self) -> SourceOptions {
        SourceOptions::with_interval(Duration::from_millis(self.tracking.location_interval_ms))
            .min_displacement(self.tracking.min_displacement_meters)
    }

    /// Collector client timeouts.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.upload.connect_timeout_secs),
            request: Duration::from_secs(self.upload.request_timeout_secs),
        }
    }

    /// Everything a session needs besides its collaborators.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            source: self.source_options(),
            upload_interval: Duration::from_millis(self.upload.upload_interval_ms),
            retention: Duration::from_secs(u64::from(self.retention.retention_days) * 86_400),
            sweep_every: Duration::from_secs(u64::from(self.retention.sweep_interval_hours) * 3_600),
        }
    }
}

/// Fix acquisition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Target spacing between fixes, in milliseconds.
    pub location_interval_ms: u64,
    /// Fixes closer than this to the previous one are ignored.
    pub min_displacement_meters: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            location_interval_ms: 30_000,
            min_displacement_meters: 5.0,
        }
    }
}

impl TrackingConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(MIN_LOCATION_INTERVAL_MS..=MAX_LOCATION_INTERVAL_MS)
            .contains(&self.location_interval_ms)
        {
            errors.push(ValidationError {
                field: "tracking.location_interval_ms".to_string(),
                message: format!(
                    "location interval {} is out of range ({}-{} ms)",
                    self.location_interval_ms, MIN_LOCATION_INTERVAL_MS, MAX_LOCATION_INTERVAL_MS
                ),
            });
        }

        if !self.min_displacement_meters.is_finite() || self.min_displacement_meters < 0.0 {
            errors.push(ValidationError {
                field: "tracking.min_displacement_meters".to_string(),
                message: format!(
                    "displacement {} must be a finite, non-negative number",
                    self.min_displacement_meters
                ),
            });
        }

        errors
    }
}

/// Collector and upload cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Collector base URL.
    pub remote_base_url: String,
    /// Spacing between upload cycles, in milliseconds.
    pub upload_interval_ms: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            remote_base_url: "https://localhost:8443".to_string(),
            upload_interval_ms: 50_000,
            connect_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let url = self.remote_base_url.trim();
        if url.is_empty() {
            errors.push(ValidationError {
                field: "upload.remote_base_url".to_string(),
                message: "collector URL cannot be empty".to_string(),
            });
        } else if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError {
                field: "upload.remote_base_url".to_string(),
                message: format!(
                    "invalid URL '{}': must start with http:// or https://",
                    self.remote_base_url
                ),
            });
        }

        if !(MIN_UPLOAD_INTERVAL_MS..=MAX_UPLOAD_INTERVAL_MS).contains(&self.upload_interval_ms) {
            errors.push(ValidationError {
                field: "upload.upload_interval_ms".to_string(),
                message: format!(
                    "upload interval {} is out of range ({}-{} ms)",
                    self.upload_interval_ms, MIN_UPLOAD_INTERVAL_MS, MAX_UPLOAD_INTERVAL_MS
                ),
            });
        }

        for (field, value) in [
            ("upload.connect_timeout_secs", self.connect_timeout_secs),
            ("upload.request_timeout_secs", self.request_timeout_secs),
        ] {
            if value == 0 || value > MAX_TIMEOUT_SECS {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("timeout {} must be 1-{} seconds", value, MAX_TIMEOUT_SECS),
                });
            }
        }

        errors
    }
}

/// Local retention of uploaded samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Uploaded samples older than this many days are deleted.
    pub retention_days: u32,
    /// Hours between retention sweeps.
    pub sweep_interval_hours: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            sweep_interval_hours: 24,
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.retention_days == 0 {
            errors.push(ValidationError {
                field: "retention.retention_days".to_string(),
                message: "retention must be at least 1 day".to_string(),
            });
        }
        if self.sweep_interval_hours == 0 {
            errors.push(ValidationError {
                field: "retention.sweep_interval_hours".to_string(),
                message: "sweep interval must be at least 1 hour".to_string(),
            });
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
    /// File holding the persisted device id.
    pub device_id_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: geotrack_store::default_db_path(),
            device_id_path: geotrack_store::default_device_id_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }
        if self.device_id_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.device_id_path".to_string(),
                message: "device id path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Position source settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// JSON-lines trace replayed by `geotrack run`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_path: Option<PathBuf>,
}

impl SourceConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        match &self.replay_path {
            Some(path) if path.as_os_str().is_empty() => vec![ValidationError {
                field: "source.replay_path".to_string(),
                message: "replay path cannot be empty".to_string(),
            }],
            _ => Vec::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `upload.remote_base_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geotrack")
        .join("geotrack.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_fields(config: &Config) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.tracking.location_interval_ms, 30_000);
        assert_eq!(config.tracking.min_displacement_meters, 5.0);
        assert_eq!(config.upload.remote_base_url, "https://localhost:8443");
        assert_eq!(config.upload.upload_interval_ms, 50_000);
        assert_eq!(config.retention.retention_days, 7);
        assert!(config.source.replay_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.path, geotrack_store::default_db_path());
        assert_eq!(config.device_id_path, geotrack_store::default_device_id_path());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [upload]
            remote_base_url = "http://10.0.2.2:8080"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.upload.remote_base_url, "http://10.0.2.2:8080");
        assert_eq!(config.upload.upload_interval_ms, 50_000);
        assert_eq!(config.tracking, TrackingConfig::default());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [tracking]
            location_interval_ms = 10000
            min_displacement_meters = 0.0

            [upload]
            remote_base_url = "https://collector.example.com"
            upload_interval_ms = 60000
            connect_timeout_secs = 10
            request_timeout_secs = 20

            [retention]
            retention_days = 14
            sweep_interval_hours = 12

            [storage]
            path = "/data/samples.db"
            device_id_path = "/data/device_id"

            [source]
            replay_path = "/data/trace.jsonl"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());

        let settings = config.session_settings();
        assert_eq!(settings.upload_interval, Duration::from_secs(60));
        assert_eq!(settings.retention, Duration::from_secs(14 * 86_400));
        assert_eq!(settings.sweep_every, Duration::from_secs(12 * 3_600));
        assert_eq!(settings.source.interval, Duration::from_secs(10));
        assert_eq!(settings.source.min_displacement_m, 0.0);

        let timeouts = config.timeouts();
        assert_eq!(timeouts.connect, Duration::from_secs(10));
        assert_eq!(timeouts.request, Duration::from_secs(20));
        assert_eq!(
            config.source.replay_path,
            Some(PathBuf::from("/data/trace.jsonl"))
        );
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("geotrack.toml");

        let mut config = Config::default();
        config.upload.remote_base_url = "http://127.0.0.1:9000".to_string();
        config.storage.path = PathBuf::from("/tmp/test.db");
        config.source.replay_path = Some(PathBuf::from("/tmp/trace.jsonl"));
        config.save(&config_path).unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/geotrack.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_bad_url() {
        let mut config = Config::default();
        config.upload.remote_base_url = "ftp://collector".to_string();
        assert_eq!(validation_fields(&config), vec!["upload.remote_base_url"]);

        config.upload.remote_base_url = "  ".to_string();
        assert_eq!(validation_fields(&config), vec!["upload.remote_base_url"]);
    }

    #[test]
    fn test_validate_intervals() {
        let mut config = Config::default();
        config.tracking.location_interval_ms = 0;
        config.upload.upload_interval_ms = MAX_UPLOAD_INTERVAL_MS + 1;
        config.upload.request_timeout_secs = 0;

        let fields = validation_fields(&config);
        assert_eq!(
            fields,
            vec![
                "tracking.location_interval_ms",
                "upload.upload_interval_ms",
                "upload.request_timeout_secs",
            ]
        );
    }

    #[test]
    fn test_validate_displacement() {
        let mut config = Config::default();
        config.tracking.min_displacement_meters = -1.0;
        assert_eq!(
            validation_fields(&config),
            vec!["tracking.min_displacement_meters"]
        );

        config.tracking.min_displacement_meters = f64::INFINITY;
        assert_eq!(
            validation_fields(&config),
            vec!["tracking.min_displacement_meters"]
        );
    }

    #[test]
    fn test_validate_retention_and_paths() {
        let mut config = Config::default();
        config.retention.retention_days = 0;
        config.retention.sweep_interval_hours = 0;
        config.storage.path = PathBuf::new();
        config.source.replay_path = Some(PathBuf::new());

        let fields = validation_fields(&config);
        assert_eq!(
            fields,
            vec![
                "retention.retention_days",
                "retention.sweep_interval_hours",
                "storage.path",
                "source.replay_path",
            ]
        );
    }

    #[test]
    fn test_validation_error_display() {
        let error = ConfigError::Validation(vec![ValidationError {
            field: "upload.remote_base_url".to_string(),
            message: "collector URL cannot be empty".to_string(),
        }]);
        let display = error.to_string();
        assert!(display.contains("upload.remote_base_url"));
        assert!(display.contains("  - "));
    }
}
