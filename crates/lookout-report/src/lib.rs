//! Lookout Report - telemetry delivery pipeline
//!
//! Provides:
//! - Ingestion with sampling, level filtering and a before-report hook
//! - Batched delivery on a timer with size-triggered and eager flushes
//! - Bounded, fixed-delay retries
//! - Offline buffering driven by a connectivity monitor
//! - Best-effort final delivery on teardown
//!
//! ## Modules
//!
//! - [`dispatcher`] - The [`Dispatcher`](dispatcher::Dispatcher) and its builder
//! - [`filter`] - Sampler, level filter and hook
//! - [`queue`] - Dispatch queue and offline buffer
//! - [`retry`] - Retry controller
//! - [`scheduler`] - Batch timer loop
//! - [`connectivity`] - Online/offline signalling
//! - [`integrations`] - Fan-out to secondary sinks
//! - [`sanitize`] - Ingestion-time payload sanitizer

pub mod connectivity;
pub mod dispatcher;
pub mod filter;
pub mod integrations;
pub mod queue;
pub mod retry;
pub mod sanitize;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use connectivity::ConnectivityMonitor;
pub use dispatcher::{
    DispatchStatus, Dispatcher, DispatcherBuilder, Disposition, FlushOutcome,
};
pub use filter::{BeforeReport, HookDecision};

use thiserror::Error;

/// Errors that can occur while constructing a dispatcher
#[derive(Debug, Error)]
pub enum ReportError {
    /// No tokio runtime was supplied or running
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// The configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A domain-level error propagated from lookout-core
    #[error("Domain error: {0}")]
    DomainError(#[from] lookout_core::domain::errors::DomainError),
}
