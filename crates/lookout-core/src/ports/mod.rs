//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the dispatcher
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IReportTransport`] - Delivery of report bodies to the collector
//! - [`IIntegration`] - Named secondary sinks for error payloads
//! - [`IDispatchObserver`] - Dispatcher lifecycle events (metrics, status)

pub mod integration;
pub mod observer;
pub mod transport;

pub use integration::IIntegration;
pub use observer::{DeliveryMode, DropReason, IDispatchObserver, NoopObserver};
pub use transport::IReportTransport;
