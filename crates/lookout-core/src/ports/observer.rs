//! Dispatch observer port
//!
//! Observers receive lifecycle events from the dispatcher so adapters can
//! export counters and gauges without the dispatcher depending on a
//! metrics library. Every method has a no-op default.

use std::fmt;

use crate::domain::Category;

/// How a delivery attempt was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Batch envelope POST
    Batch,
    /// One payload per POST (non-batched mode)
    Single,
    /// Detached beacon request
    Beacon,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Batch => "batch",
            DeliveryMode::Single => "single",
            DeliveryMode::Beacon => "beacon",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a payload or item never reached the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Rejected by the sample rate
    Sampled,
    /// Rejected by the report level filter
    Filtered,
    /// Vetoed by the before-report hook
    Vetoed,
    /// Exhausted `max_retry_count`
    RetryBudget,
    /// Failed after the dispatcher was torn down
    Closed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Sampled => "sampled",
            DropReason::Filtered => "filtered",
            DropReason::Vetoed => "vetoed",
            DropReason::RetryBudget => "retry_budget",
            DropReason::Closed => "closed",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port trait for dispatcher lifecycle events
pub trait IDispatchObserver: Send + Sync {
    /// A payload was accepted into the dispatch queue
    fn on_queued(&self, _category: Category) {}

    /// `count` items were handed off successfully
    fn on_delivered(&self, _mode: DeliveryMode, _count: usize) {}

    /// A delivery attempt covering `count` items failed
    fn on_failed(&self, _mode: DeliveryMode, _count: usize) {}

    /// `count` payloads or items were discarded
    fn on_dropped(&self, _reason: DropReason, _count: usize) {}

    /// `count` items were moved to the offline buffer
    fn on_offlined(&self, _count: usize) {}

    /// `count` items were moved from the offline buffer back to the queue
    fn on_replayed(&self, _count: usize) {}

    /// Current dispatch queue and offline buffer sizes
    fn on_depth(&self, _queued: usize, _offline: usize) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IDispatchObserver for NoopObserver {}
