//! Domain entities
//!
//! This module contains the core domain types for Lookout:
//! - Schema-less payloads and their classification (category, level, environment)
//! - The `ReportItem` delivery unit and the batch wire envelope
//! - Domain-specific error types

pub mod errors;
pub mod payload;
pub mod report_item;

// Re-export commonly used types
pub use errors::DomainError;
pub use payload::{keys, AppStamp, Category, Environment, Payload, RecordLevel, ReportLevel};
pub use report_item::{generate_item_id, BatchEnvelope, ReportItem};
