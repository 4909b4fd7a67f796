//! Lookout Transport - HTTP delivery to the collector
//!
//! Provides the [`http::HttpTransport`] adapter for the
//! [`IReportTransport`](lookout_core::ports::IReportTransport) port:
//! - Confirmed JSON POSTs with configured headers and a request timeout
//! - A native beacon: a detached background POST with a size quota
//!
//! ## Modules
//!
//! - [`http`] - reqwest-backed transport

pub mod http;

use thiserror::Error;

/// Largest body the beacon path accepts, in bytes.
pub const BEACON_MAX_BYTES: usize = 64 * 1024;

/// Errors that can occur when delivering to the collector
#[derive(Debug, Error)]
pub enum TransportError {
    /// No endpoint is configured
    #[error("Transport disabled: no endpoint configured")]
    Disabled,

    /// The configured endpoint could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A configured header name or value is not valid HTTP
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The collector answered with a non-2xx status
    #[error("Collector returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The body could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether a later attempt might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::NetworkError(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = TransportError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "Collector returned HTTP 503: unavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = TransportError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(!err.is_retryable());
        assert!(!TransportError::Disabled.is_retryable());
    }
}
