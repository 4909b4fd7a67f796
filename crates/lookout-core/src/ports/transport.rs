//! Report transport port (driven/secondary port)
//!
//! This module defines the interface the dispatcher uses to hand serialized
//! payloads to a collector. Implementations may use an HTTP client, a
//! local socket, or an in-memory recorder in tests.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because failure causes are adapter-specific.
//!   The dispatcher only distinguishes success from failure.
//! - `send_beacon` is fire-and-forget: it returns whether the request was
//!   accepted for background delivery, never whether it arrived.

use serde_json::Value;

/// Port trait for delivering report bodies to the collector endpoint
///
/// The body is either a single stamped payload or a batch envelope of the
/// form `{ "batch": [...], "timestamp": ms }`. Bodies are always sent as
/// JSON.
#[async_trait::async_trait]
pub trait IReportTransport: Send + Sync {
    /// POSTs `body` and resolves once the collector answers
    ///
    /// # Errors
    /// Returns an error for network failures and non-2xx responses.
    async fn post(&self, body: &Value) -> anyhow::Result<()>;

    /// Queues `body` for detached delivery that survives caller teardown
    ///
    /// Returns `false` when the request could not be accepted (for example
    /// because the body exceeds the beacon size quota). The caller must
    /// then fall back to [`IReportTransport::post`].
    fn send_beacon(&self, body: &Value) -> bool;

    /// Whether this transport offers beacon delivery at all
    fn supports_beacon(&self) -> bool {
        true
    }
}
