//! Batch scheduler - turns timer ticks and flush requests into flushes
//!
//! The [`BatchScheduler`] owns the periodic timer of the batched delivery
//! path. It wakes up for one of three reasons and hands control to the
//! dispatcher's flush routine:
//!
//! ```text
//!   interval tick ──┐
//!                   ├──→ BatchScheduler ──→ flush()
//!   Notify (size /  │
//!   eager drain) ───┘
//!                          CancellationToken ──→ stop
//! ```
//!
//! Requests raised while a flush is running are remembered by the
//! `Notify` permit and served on the next loop iteration, which is how
//! eager draining takes effect on the next scheduler turn.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Why the scheduler started a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The periodic batch interval elapsed
    Tick,
    /// A flush was requested (batch size reached, eager drain, reconnect)
    Requested,
}

/// Periodic driver of the batched delivery path
#[derive(Debug)]
pub struct BatchScheduler {
    /// Period of the steady-state timer
    interval: Duration,
    /// Wakes the loop for an out-of-band flush
    flush_signal: Arc<Notify>,
    /// Stops the loop on teardown
    shutdown: CancellationToken,
}

impl BatchScheduler {
    /// Creates a new `BatchScheduler`
    ///
    /// # Arguments
    /// * `interval` - Period of the steady-state timer
    /// * `flush_signal` - Notified by the dispatcher to request a flush
    /// * `shutdown` - Cancelled on teardown
    pub fn new(interval: Duration, flush_signal: Arc<Notify>, shutdown: CancellationToken) -> Self {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Creating batch scheduler"
        );
        Self {
            interval,
            flush_signal,
            shutdown,
        }
    }

    /// Main loop
    ///
    /// `flush` is called for every tick or request. It returns `None` once
    /// the dispatcher is gone, which ends the loop just like cancellation.
    /// The first tick fires one full interval after start.
    pub async fn run<F, Fut>(self, mut flush: F)
    where
        F: FnMut(FlushTrigger) -> Option<Fut>,
        Fut: Future<Output = ()>,
    {
        info!("Batch scheduler starting");

        let start = tokio::time::Instant::now() + self.interval;
        let mut timer = tokio::time::interval_at(start, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("Batch scheduler cancelled");
                    break;
                }

                _ = self.flush_signal.notified() => FlushTrigger::Requested,

                _ = timer.tick() => FlushTrigger::Tick,
            };

            debug!(?trigger, "Batch scheduler woke up");
            match flush(trigger) {
                Some(fut) => fut.await,
                None => {
                    debug!("Dispatcher dropped, batch scheduler exiting");
                    break;
                }
            }
        }

        info!("Batch scheduler stopped");
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<FlushTrigger>>>;

    fn spawn_scheduler(interval: Duration) -> (Arc<Notify>, CancellationToken, Log) {
        let signal = Arc::new(Notify::new());
        let token = CancellationToken::new();
        let log: Log = Arc::default();

        let scheduler = BatchScheduler::new(interval, signal.clone(), token.clone());
        let sink = log.clone();
        tokio::spawn(scheduler.run(move |trigger| {
            sink.lock().unwrap().push(trigger);
            Some(async {})
        }));

        (signal, token, log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_a_full_interval() {
        let (_signal, token, log) = spawn_scheduler(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(log.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*log.lock().unwrap(), vec![FlushTrigger::Tick]);

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_repeat_on_interval() {
        let (_signal, token, log) = spawn_scheduler(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(log.lock().unwrap().len(), 3);

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_flushes_without_waiting_for_timer() {
        let (signal, token, log) = spawn_scheduler(Duration::from_secs(60));

        signal.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*log.lock().unwrap(), vec![FlushTrigger::Requested]);

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loop() {
        let signal = Arc::new(Notify::new());
        let token = CancellationToken::new();
        let scheduler = BatchScheduler::new(Duration::from_secs(1), signal, token.clone());

        token.cancel();
        tokio::time::timeout(
            Duration::from_secs(2),
            scheduler.run(|_| Some(async {})),
        )
        .await
        .expect("scheduler should exit when cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_exits_when_flush_target_is_gone() {
        let signal = Arc::new(Notify::new());
        let scheduler =
            BatchScheduler::new(Duration::from_secs(1), signal.clone(), CancellationToken::new());

        signal.notify_one();
        tokio::time::timeout(
            Duration::from_secs(2),
            scheduler.run(|_| None::<std::future::Ready<()>>),
        )
        .await
        .expect("scheduler should exit when the dispatcher is dropped");
    }
}
