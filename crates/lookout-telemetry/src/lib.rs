//! Lookout Telemetry - Observability and producer helpers
//!
//! Provides:
//! - `MetricsRegistry`: Prometheus metrics fed by dispatcher events
//! - `MetricsServer`: HTTP server for Prometheus scraping and `/status`
//! - `ErrorCapture`: Fingerprinted, rate-limited error payloads
//! - Panic reporter: panics as error payloads

pub mod error_capture;
pub mod metrics;
pub mod panic_report;
pub mod server;

pub use error_capture::{CaptureError, CaptureOutcome, ErrorCapture, ErrorInfo};
pub use metrics::MetricsRegistry;
pub use panic_report::{install_panic_reporter, uninstall_panic_reporter};
pub use server::{MetricsServer, StatusSource};
