//! Integration tests for lookout-transport
//!
//! Uses wiremock to simulate the collector and verifies the wire format,
//! header handling, failure mapping and beacon delivery of HttpTransport.

mod common;

mod test_beacon;
mod test_post;
