//! Domain error types
//!
//! Errors raised while parsing or validating domain values such as report
//! levels, environments and collector endpoints.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Unknown report level name
    #[error("Invalid report level: {0}")]
    InvalidLevel(String),

    /// Unknown deployment environment name
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Unknown payload category
    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    /// Sample rate outside of `[0, 1]`
    #[error("Invalid sample rate: {0} (expected a value in [0, 1])")]
    InvalidSampleRate(f64),

    /// Collector endpoint is not an absolute http(s) URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
