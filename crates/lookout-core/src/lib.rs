//! Lookout Core - Domain types, configuration and ports
//!
//! This crate contains the pieces every other Lookout crate agrees on:
//! - **Domain types** - `ReportItem`, `Payload`, `Category`, `ReportLevel`
//! - **Configuration** - the YAML-backed [`config::Config`] with validation and a builder
//! - **Port definitions** - Traits for adapters: `IReportTransport`, `IIntegration`,
//!   `IDispatchObserver`
//!
//! # Architecture
//!
//! The domain module has no I/O. Ports define the trait interfaces that the
//! dispatcher depends on; their implementations live in adapter crates
//! (`lookout-transport`, `lookout-telemetry`).

pub mod config;
pub mod domain;
pub mod ports;
