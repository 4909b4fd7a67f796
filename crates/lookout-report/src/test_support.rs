//! In-memory transport and helpers for dispatcher tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use lookout_core::ports::IReportTransport;
use serde_json::Value;
use tokio::sync::Semaphore;

/// Transport that records every body it is handed
pub struct RecordingTransport {
    posts: Mutex<Vec<Value>>,
    beacons: Mutex<Vec<Value>>,
    fail: AtomicBool,
    accept_beacons: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            posts: Mutex::default(),
            beacons: Mutex::default(),
            fail: AtomicBool::new(false),
            accept_beacons: AtomicBool::new(true),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Every POST fails from now on.
    pub fn failing() -> Self {
        let transport = Self::new();
        transport.set_failing(true);
        transport
    }

    /// POSTs block until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        let transport = Self::new();
        transport.gated.store(true, Ordering::SeqCst);
        transport
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_accept_beacons(&self, accept: bool) {
        self.accept_beacons.store(accept, Ordering::SeqCst);
    }

    /// Lets one blocked POST complete.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn posts(&self) -> Vec<Value> {
        self.posts.lock().unwrap().clone()
    }

    pub fn beacons(&self) -> Vec<Value> {
        self.beacons.lock().unwrap().clone()
    }

    /// Waits (in tokio time) until at least `n` POSTs were seen.
    pub async fn wait_for_posts(&self, n: usize) -> Vec<Value> {
        for _ in 0..1_000 {
            if self.posts.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.posts()
    }
}

#[async_trait::async_trait]
impl IReportTransport for RecordingTransport {
    async fn post(&self, body: &Value) -> anyhow::Result<()> {
        self.posts.lock().unwrap().push(body.clone());
        if self.gated.load(Ordering::SeqCst) {
            let permit = self.gate.acquire().await?;
            permit.forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("collector unavailable");
        }
        Ok(())
    }

    fn send_beacon(&self, body: &Value) -> bool {
        if !self.accept_beacons.load(Ordering::SeqCst) {
            return false;
        }
        self.beacons.lock().unwrap().push(body.clone());
        true
    }
}

/// Ids (`message` fields) of a batch body, in order
pub fn batch_messages(body: &Value) -> Vec<String> {
    body["batch"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["message"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
