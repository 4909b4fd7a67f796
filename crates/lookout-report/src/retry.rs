//! Retry controller
//!
//! Fixed-delay, bounded-count retries. Every failed attempt increments an
//! item's `retry_count`; an item whose count exceeds `max_retry_count` is
//! dropped for good. There is no dead-letter store.
//!
//! `retry_interval` only paces the non-batched path. Batch retries are
//! paced by the scheduler cadence.

use std::time::Duration;

use lookout_core::config::ReportConfig;
use lookout_core::domain::ReportItem;
use tracing::warn;

/// Result of settling a failed batch
#[derive(Debug, Default)]
pub struct RetryOutcome {
    /// Items that still have budget, in their original order
    pub retained: Vec<ReportItem>,
    /// Number of items whose budget is exhausted
    pub dropped: usize,
}

/// Bounded, fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retry_count: u32,
    pub retry_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            max_retry_count,
            retry_interval,
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.max_retry_count, config.retry_interval())
    }

    /// Records a failure on `item` and returns whether it may be retried.
    pub fn record_failure(&self, item: &mut ReportItem) -> bool {
        item.record_failure();
        let keep = item.within_retry_budget(self.max_retry_count);
        if !keep {
            warn!(
                item_id = item.id(),
                attempts = item.retry_count(),
                "Retry budget exhausted, dropping report"
            );
        }
        keep
    }

    /// Records a failure on every item of `batch` and splits it.
    pub fn settle_failed_batch(&self, batch: Vec<ReportItem>) -> RetryOutcome {
        let mut outcome = RetryOutcome::default();
        for mut item in batch {
            if self.record_failure(&mut item) {
                outcome.retained.push(item);
            } else {
                outcome.dropped += 1;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::domain::Payload;

    fn item(id: &str) -> ReportItem {
        ReportItem::with_id(id, Payload::new(), 0)
    }

    #[test]
    fn test_item_is_attempted_budget_plus_one_times() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let mut it = item("a");

        let mut attempts = 1;
        while policy.record_failure(&mut it) {
            attempts += 1;
        }
        assert_eq!(attempts, 4);
        assert_eq!(it.retry_count(), 4);
    }

    #[test]
    fn test_settle_keeps_order_and_counts_drops() {
        let policy = RetryPolicy::new(1, Duration::ZERO);
        let mut exhausted = item("b");
        exhausted.record_failure();

        let outcome = policy.settle_failed_batch(vec![item("a"), exhausted, item("c")]);
        let ids: Vec<&str> = outcome.retained.iter().map(|i| i.id()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(outcome.dropped, 1);
        assert!(outcome.retained.iter().all(|i| i.retry_count() == 1));
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let outcome = policy.settle_failed_batch(vec![item("a")]);
        assert!(outcome.retained.is_empty());
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn test_from_config() {
        let config = ReportConfig::default();
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retry_count, 3);
        assert_eq!(policy.retry_interval, Duration::from_secs(3));
    }
}
