//! Integration tests for detached beacon delivery

use lookout_core::ports::IReportTransport;
use serde_json::json;

use crate::common;

#[tokio::test]
async fn test_beacon_is_accepted_and_delivered_in_background() {
    let (server, transport) = common::setup_collector(200).await;

    let body = json!({"message": "unload", "category": "error"});
    assert!(transport.send_beacon(&body));

    let bodies = common::wait_for_requests(&server, 1).await;
    assert_eq!(bodies, vec![body]);
}

#[tokio::test]
async fn test_beacon_outlives_the_transport() {
    let (server, transport) = common::setup_collector(200).await;

    let body = json!({"batch": [{"message": "last"}], "timestamp": 1});
    assert!(transport.send_beacon(&body));
    drop(transport);

    let bodies = common::wait_for_requests(&server, 1).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["batch"][0]["message"], "last");
}

#[tokio::test]
async fn test_beacon_acceptance_ignores_server_failure() {
    let (server, transport) = common::setup_collector(503).await;

    assert!(transport.send_beacon(&json!({"message": "x"})));
    let bodies = common::wait_for_requests(&server, 1).await;
    assert_eq!(bodies.len(), 1);
}

#[tokio::test]
async fn test_oversized_beacon_is_refused_without_request() {
    let (server, transport) = common::setup_collector(200).await;

    let big = "x".repeat(lookout_transport::BEACON_MAX_BYTES + 1);
    assert!(!transport.send_beacon(&json!({"message": big})));

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_beacons() {
    let (server, transport) = common::setup_collector(200).await;

    assert!(transport.send_beacon(&json!({"message": "a"})));
    assert!(transport.send_beacon(&json!({"message": "b"})));
    assert!(transport.drain(std::time::Duration::from_secs(5)).await);
    assert_eq!(transport.pending_beacons(), 0);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);

    // still usable after a drain
    assert!(transport.send_beacon(&json!({"message": "c"})));
    assert!(transport.drain(std::time::Duration::from_secs(5)).await);
    assert_eq!(common::wait_for_requests(&server, 3).await.len(), 3);
}
