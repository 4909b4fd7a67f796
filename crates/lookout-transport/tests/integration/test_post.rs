//! Integration tests for confirmed POST delivery

use lookout_core::ports::IReportTransport;
use lookout_transport::http::HttpTransport;
use lookout_transport::TransportError;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_post_sends_json_with_configured_headers() {
    let server = MockServer::start().await;
    let body = json!({"batch": [{"message": "a"}, {"message": "b"}], "timestamp": 1});

    Mock::given(method("POST"))
        .and(path(common::COLLECT_PATH))
        .and(header("content-type", "application/json"))
        .and(header("x-api-key", "test-key"))
        .and(body_json(&body))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = lookout_core::config::ConfigBuilder::new()
        .endpoint(format!("{}{}", server.uri(), common::COLLECT_PATH))
        .header("X-Api-Key", "test-key")
        .build();
    let transport = HttpTransport::new(&config.report).unwrap();

    transport.post(&body).await.expect("post should succeed");
}

#[tokio::test]
async fn test_configured_header_overrides_content_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("content-type", "application/vnd.lookout+json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = lookout_core::config::ConfigBuilder::new()
        .endpoint(server.uri())
        .header("Content-Type", "application/vnd.lookout+json")
        .build();
    let transport = HttpTransport::new(&config.report).unwrap();

    transport.send(&json!({"a": 1})).await.unwrap();
}

#[tokio::test]
async fn test_non_2xx_is_a_failure() {
    let (_server, transport) = common::setup_collector(500).await;

    let err = transport.send(&json!({"message": "x"})).await.unwrap_err();
    match err {
        TransportError::Status { status, .. } => assert_eq!(status, 500),
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(transport.post(&json!({"message": "x"})).await.is_err());
}

#[tokio::test]
async fn test_connection_refused_is_a_failure() {
    // Bind and drop a server so the port is closed.
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let transport = HttpTransport::with_endpoint(uri).unwrap();
    let err = transport.send(&json!({"message": "x"})).await.unwrap_err();
    assert!(matches!(err, TransportError::NetworkError(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_single_payload_is_sent_bare() {
    let (server, transport) = common::setup_collector(200).await;

    let payload = json!({"message": "boom", "category": "error", "appId": "shop"});
    transport.post(&payload).await.unwrap();

    let bodies = common::wait_for_requests(&server, 1).await;
    assert_eq!(bodies, vec![payload]);
}
