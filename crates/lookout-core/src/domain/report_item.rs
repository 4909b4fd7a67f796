//! ReportItem domain entity
//!
//! A [`ReportItem`] is the unit of delivery. It wraps a stamped payload
//! together with the bookkeeping the dispatcher needs to retry it.
//!
//! ## Lifecycle
//!
//! ```text
//!   ┌─────────┐  flush   ┌──────────┐  2xx / beacon accepted   ┌───────────┐
//!   │ Pending │ ───────► │ InFlight │ ───────────────────────► │ Delivered │
//!   └─────────┘          └──────────┘                          └───────────┘
//!        ▲                    │
//!        │  retry_count <= max│ failure
//!        └────────────────────┤
//!                             │ retry_count > max
//!                             ▼
//!                        ┌─────────┐
//!                        │ Dropped │
//!                        └─────────┘
//! ```
//!
//! Everything except `retry_count` is fixed at construction.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::payload::{payload_category, Category, Payload};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix appended to the time-based id prefix.
const ID_SUFFIX_LEN: usize = 5;

/// A queued telemetry record awaiting delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    id: String,
    payload: Payload,
    enqueued_at: i64,
    retry_count: u32,
}

impl ReportItem {
    /// Creates a new item stamped with a fresh id and the current time.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: generate_item_id(),
            payload,
            enqueued_at: Utc::now().timestamp_millis(),
            retry_count: 0,
        }
    }

    /// Rebuilds an item with a known id and enqueue time.
    pub fn with_id(id: impl Into<String>, payload: Payload, enqueued_at: i64) -> Self {
        Self {
            id: id.into(),
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Milliseconds since the Unix epoch at which the item was created
    pub fn enqueued_at(&self) -> i64 {
        self.enqueued_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// The stamped `category` of the payload, if present
    pub fn category(&self) -> Option<Category> {
        payload_category(&self.payload)
    }

    /// Records a failed delivery attempt and returns the new retry count.
    pub fn record_failure(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }

    /// Whether the item may still be retried under `max_retry_count`.
    pub fn within_retry_budget(&self, max_retry_count: u32) -> bool {
        self.retry_count <= max_retry_count
    }
}

/// Wire envelope for a batch delivery: `{ "batch": [...], "timestamp": ms }`
#[derive(Debug, Serialize)]
pub struct BatchEnvelope<'a> {
    pub batch: Vec<&'a Payload>,
    pub timestamp: i64,
}

impl<'a> BatchEnvelope<'a> {
    /// Builds an envelope over `items`, stamped with the current time.
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a ReportItem>,
    {
        Self {
            batch: items.into_iter().map(ReportItem::payload).collect(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Generates a best-effort unique id: base-36 milliseconds plus a random suffix.
pub fn generate_item_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut id = to_base36(millis);
    let mut rng = rand::thread_rng();
    for _ in 0..ID_SUFFIX_LEN {
        let idx = rng.gen_range(0..ID_ALPHABET.len());
        id.push(ID_ALPHABET[idx] as char);
    }
    id
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ID_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
