//! HTTP client for the remote collector.
//!
//! The collector exposes three endpoints under `<base>/api/location/`:
//! `upload` (POST one record), `health` and `list`. Every response body is
//! an [`Envelope`]; an upload only counts when the HTTP status is 2xx *and*
//! the envelope's `statusCode` is 200.
//!
//! # Example
//!
//! ```no_run
//! use geotrack_core::client::CollectorClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CollectorClient::new("http://localhost:8080")?;
//! println!("Collector says: {}", client.health().await?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use geotrack_types::{Envelope, RemoteLocation, UploadRecord};

use crate::sync::{SubmitOutcome, UploadTarget};

/// HTTP client for the collector API.
#[derive(Debug, Clone)]
pub struct CollectorClient {
    client: Client,
    base_url: String,
}

/// Error type for collector client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The collector is not reachable.
    #[error("Collector not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Non-2xx HTTP status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// 2xx response whose envelope reports a failure.
    #[error("Collector rejected request ({status_code}): {message}")]
    Rejected { status_code: i32, message: String },

    /// 2xx response whose body is not an envelope.
    #[error("Undecodable response: {0}")]
    Decode(String),
}

/// Result type for collector client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Connection and request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Whole-request deadline, from send until the body is read.
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Duration::from_secs(30),
        }
    }
}

impl CollectorClient {
    /// Create a client with default timeouts.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The collector base URL (e.g., "https://collector.example.com")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeouts(base_url, Timeouts::default())
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(base_url: &str, timeouts: Timeouts) -> Result<Self> {
        let base_url = normalize_url(base_url)?;

        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { client, base_url })
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = normalize_url(base_url)?;
        Ok(Self { client, base_url })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit one record and return the collector's envelope.
    ///
    /// A rejected envelope is returned as `Ok`; check
    /// [`Envelope::is_success`].
    pub async fn upload(&self, record: &UploadRecord) -> Result<Envelope<serde_json::Value>> {
        let url = self.endpoint("upload");
        let response = self.client.post(&url).json(record).send().await.map_err(|e| {
            ClientError::NotReachable {
                url: url.clone(),
                source: e,
            }
        })?;

        self.handle_response(response).await
    }

    /// Ask the collector whether it is up.
    ///
    /// Returns the envelope's `data` string, or `"OK"` when it carries none.
    pub async fn health(&self) -> Result<String> {
        let envelope: Envelope<String> = self.get(&self.endpoint("health")).await?;
        Ok(envelope.data.unwrap_or_else(|| "OK".to_string()))
    }

    /// Fetch everything the collector has stored.
    pub async fn list_locations(&self) -> Result<Vec<RemoteLocation>> {
        let envelope: Envelope<Vec<RemoteLocation>> = self.get(&self.endpoint("list")).await?;
        if !envelope.is_success() {
            return Err(ClientError::Rejected {
                status_code: envelope.status_code,
                message: envelope.op_desc,
            });
        }
        Ok(envelope.data.unwrap_or_default())
    }

    /// Check if the collector is reachable.
    pub async fn is_reachable(&self) -> bool {
        self.health().await.is_ok()
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/api/location/{}", self.base_url, name)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| ClientError::NotReachable {
                    url: url.to_string(),
                    source: e,
                })?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| status.to_string());

            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn normalize_url(base_url: &str) -> Result<String> {
    let base_url = base_url.trim_end_matches('/').to_string();

    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ClientError::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }

    Ok(base_url)
}

#[async_trait]
impl UploadTarget for CollectorClient {
    async fn submit(&self, record: &UploadRecord) -> SubmitOutcome {
        match self.upload(record).await {
            Ok(envelope) if envelope.is_success() => SubmitOutcome::Success,
            Ok(envelope) => SubmitOutcome::Rejected {
                status_code: Some(envelope.status_code),
                description: envelope.op_desc,
            },
            Err(ClientError::Decode(message)) => SubmitOutcome::Rejected {
                status_code: None,
                description: message,
            },
            Err(e) => {
                debug!("Upload transport failure: {}", e);
                SubmitOutcome::TransportFailure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CollectorClient::new("http://localhost:8080").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.endpoint("upload"),
            "http://localhost:8080/api/location/upload"
        );
    }

    #[test]
    fn test_client_normalizes_url() {
        let client = CollectorClient::new("https://collector.example.com/").unwrap();
        assert_eq!(client.base_url(), "https://collector.example.com");
    }

    #[test]
    fn test_client_invalid_url() {
        let result = CollectorClient::new("collector.example.com");
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.connect, Duration::from_secs(30));
        assert_eq!(timeouts.request, Duration::from_secs(30));
    }
}
