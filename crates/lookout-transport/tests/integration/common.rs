//! Shared test helpers for collector integration tests
//!
//! Provides a wiremock-based collector. Each helper mounts the endpoint
//! and returns an HttpTransport pointing at the mock server.

use std::time::Duration;

use lookout_core::config::ConfigBuilder;
use lookout_transport::http::HttpTransport;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the collector is mounted on
pub const COLLECT_PATH: &str = "/collect";

/// Starts a collector answering `status` on POST /collect and returns
/// a (MockServer, HttpTransport) tuple.
pub async fn setup_collector(status: u16) -> (MockServer, HttpTransport) {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECT_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;

    let config = ConfigBuilder::new()
        .endpoint(format!("{}{}", server.uri(), COLLECT_PATH))
        .header("X-Api-Key", "test-key")
        .request_timeout_ms(2_000)
        .build();
    let transport = HttpTransport::new(&config.report).expect("build transport");

    (server, transport)
}

/// Polls the mock server until it has seen `count` requests or the
/// deadline passes, returning the bodies received so far.
pub async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count || tokio::time::Instant::now() >= deadline {
            return requests
                .iter()
                .map(|r| serde_json::from_slice(&r.body).expect("json body"))
                .collect();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
