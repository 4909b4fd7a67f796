//! HTTP transport for the collector endpoint
//!
//! Wraps `reqwest::Client` with the configured headers, a request timeout
//! and the JSON wire format. Two delivery paths are offered:
//!
//! - [`HttpTransport::send`] POSTs a body and waits for a 2xx answer.
//! - [`HttpTransport::beacon`] spawns the POST onto the runtime and returns
//!   immediately. The spawned request is not tied to the caller, so it keeps
//!   running after the dispatcher is torn down. Hosts that are about to drop
//!   their runtime call [`HttpTransport::drain`] first.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lookout_core::config::ConfigBuilder;
//! use lookout_transport::http::HttpTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ConfigBuilder::new()
//!     .endpoint("https://collector.example.com/report")
//!     .build();
//! let transport = HttpTransport::new(&config.report)?;
//! transport.send(&serde_json::json!({"message": "boom"})).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use lookout_core::{config::ReportConfig, ports::IReportTransport};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{TransportError, BEACON_MAX_BYTES};

/// Timeout used when the configuration does not provide one
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// HttpTransport
// ============================================================================

/// reqwest-backed [`IReportTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// The underlying HTTP client (cheap to clone, shares its pool)
    client: Client,
    /// Collector URL; empty disables delivery
    endpoint: String,
    /// Configured headers, applied after `Content-Type`
    headers: HeaderMap,
    /// Largest body accepted by the beacon path
    beacon_limit: usize,
    /// Runtime used to spawn beacon requests
    runtime: Option<Handle>,
    /// Beacon requests still in flight, shared between clones
    beacons: TaskTracker,
}

impl HttpTransport {
    /// Creates a transport from the `report` configuration section
    ///
    /// Captures the current tokio runtime (if any) for beacon delivery.
    ///
    /// # Errors
    /// Fails when a configured header is not valid HTTP or the client
    /// cannot be built.
    pub fn new(config: &ReportConfig) -> Result<Self, TransportError> {
        let timeout = if config.request_timeout_ms == 0 {
            DEFAULT_TIMEOUT
        } else {
            config.request_timeout()
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
            headers,
            beacon_limit: BEACON_MAX_BYTES,
            runtime: Handle::try_current().ok(),
            beacons: TaskTracker::new(),
        })
    }

    /// Creates a transport posting to `endpoint` with no extra headers
    /// (useful for testing)
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let config = ReportConfig {
            endpoint: endpoint.into(),
            ..ReportConfig::default()
        };
        Self::new(&config)
    }

    /// Overrides the beacon body quota
    pub fn with_beacon_limit(mut self, bytes: usize) -> Self {
        self.beacon_limit = bytes;
        self
    }

    /// Sets the runtime used to spawn beacon requests
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Returns the configured endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POSTs `body` as JSON and waits for a 2xx response
    ///
    /// # Errors
    /// - [`TransportError::Disabled`] when no endpoint is configured
    /// - [`TransportError::Status`] for non-2xx answers
    /// - [`TransportError::NetworkError`] for connection failures and timeouts
    pub async fn send(&self, body: &Value) -> Result<(), TransportError> {
        if self.endpoint.is_empty() {
            return Err(TransportError::Disabled);
        }
        let bytes = serde_json::to_vec(body)?;
        post_bytes(&self.client, &self.endpoint, &self.headers, bytes).await
    }

    /// Hands `body` to a detached background POST
    ///
    /// Returns `false` without sending when no endpoint is configured, the
    /// body exceeds the beacon quota, or no runtime is available.
    pub fn beacon(&self, body: &Value) -> bool {
        if self.endpoint.is_empty() {
            return false;
        }

        let bytes = match serde_json::to_vec(body) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Beacon body could not be serialized");
                return false;
            }
        };

        if bytes.len() > self.beacon_limit {
            debug!(
                size = bytes.len(),
                limit = self.beacon_limit,
                "Beacon body exceeds quota"
            );
            return false;
        }

        let runtime = match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(handle) => handle,
            None => {
                debug!("No runtime available for beacon delivery");
                return false;
            }
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let headers = self.headers.clone();
        let size = bytes.len();
        self.beacons.spawn_on(
            async move {
                match post_bytes(&client, &endpoint, &headers, bytes).await {
                    Ok(()) => debug!(size, "Beacon delivered"),
                    Err(e) => debug!(size, error = %e, "Beacon delivery failed"),
                }
            },
            &runtime,
        );

        true
    }

    /// Number of beacon requests still in flight
    pub fn pending_beacons(&self) -> usize {
        self.beacons.len()
    }

    /// Waits up to `timeout` for in-flight beacon requests to finish
    ///
    /// Returns `false` when the timeout elapsed first. The transport keeps
    /// accepting beacons afterwards.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let pending = self.beacons.len();
        if pending == 0 {
            return true;
        }

        self.beacons.close();
        let finished = tokio::time::timeout(timeout, self.beacons.wait())
            .await
            .is_ok();
        self.beacons.reopen();

        if finished {
            info!(pending, "Beacon requests drained");
        } else {
            warn!(
                pending,
                remaining = self.beacons.len(),
                "Timed out waiting for beacon requests"
            );
        }
        finished
    }
}

async fn post_bytes(
    client: &Client,
    endpoint: &str,
    headers: &HeaderMap,
    bytes: Vec<u8>,
) -> Result<(), TransportError> {
    let response = client
        .post(endpoint)
        .header(CONTENT_TYPE, "application/json")
        .headers(headers.clone())
        .body(bytes)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait::async_trait]
impl IReportTransport for HttpTransport {
    async fn post(&self, body: &Value) -> anyhow::Result<()> {
        self.send(body).await.map_err(|e| {
            warn!(
                endpoint = %self.endpoint,
                retryable = e.is_retryable(),
                error = %e,
                "Report delivery failed"
            );
            anyhow::Error::new(e)
        })
    }

    fn send_beacon(&self, body: &Value) -> bool {
        self.beacon(body)
    }

    fn supports_beacon(&self) -> bool {
        self.runtime.is_some() || Handle::try_current().is_ok()
    }
}
