//! Integration sink port
//!
//! Integrations are named secondary sinks that receive a copy of every
//! accepted error payload, independent of the primary transport. They are
//! enabled per name through `report.integrations.<name>.enabled`.

use crate::domain::Payload;

/// Port trait for a named forwarding sink
///
/// `forward` is called synchronously on the ingestion path and must not
/// block. A returned error is logged by the caller and never prevents
/// the payload from being queued.
pub trait IIntegration: Send + Sync {
    /// Name matched against the `integrations` configuration map
    fn name(&self) -> &str;

    /// Receives a stamped error payload
    fn forward(&self, payload: &Payload) -> anyhow::Result<()>;
}
