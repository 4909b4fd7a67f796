//! Panic reporter installed process-wide; kept in its own test binary.

use std::sync::{Arc, Mutex};

use lookout_core::config::ConfigBuilder;
use lookout_core::ports::IReportTransport;
use lookout_report::Dispatcher;
use lookout_telemetry::{install_panic_reporter, uninstall_panic_reporter};
use serde_json::Value;

#[derive(Default)]
struct Recording {
    posts: Mutex<Vec<Value>>,
}

#[async_trait::async_trait]
impl IReportTransport for Recording {
    async fn post(&self, body: &Value) -> anyhow::Result<()> {
        self.posts.lock().unwrap().push(body.clone());
        Ok(())
    }

    fn send_beacon(&self, _body: &Value) -> bool {
        false
    }
}

#[tokio::test]
async fn test_panic_becomes_error_report() {
    let transport = Arc::new(Recording::default());
    let config = ConfigBuilder::new()
        .endpoint("http://collector.test/report")
        .batch_interval_ms(60_000)
        .build();
    let dispatcher = Dispatcher::builder(config, transport.clone())
        .sanitizer(None)
        .build()
        .unwrap();

    install_panic_reporter(dispatcher.clone());
    let result = std::thread::Builder::new()
        .name("doomed".into())
        .spawn(|| panic!("worker exploded"))
        .unwrap()
        .join();
    assert!(result.is_err());
    uninstall_panic_reporter();

    assert_eq!(dispatcher.status().queued, 1);
    dispatcher.destroy().await;

    let posts = transport.posts.lock().unwrap().clone();
    assert_eq!(posts.len(), 1);
    let report = &posts[0]["batch"][0];
    assert_eq!(report["type"], "panic");
    assert_eq!(report["message"], "worker exploded");
    assert_eq!(report["thread"], "doomed");
    assert_eq!(report["category"], "error");
    assert!(report["location"].as_str().unwrap().contains("panic_hook.rs"));
}
