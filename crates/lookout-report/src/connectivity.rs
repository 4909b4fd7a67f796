//! Connectivity monitor
//!
//! The host drives online/offline state through a [`ConnectivityMonitor`]
//! (backed by a `tokio::sync::watch` channel). The dispatcher subscribes to
//! it and reacts to every transition:
//!
//! - **offline** - nothing happens immediately; the next flush reroutes
//!   its batch to the offline buffer
//! - **online** - the offline buffer is replayed at the head of the queue
//!   and a flush is requested

use std::future::Future;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Host-side handle publishing online/offline transitions
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Returns a receiver to hand to the dispatcher builder.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Publishes a state; repeated identical states are not re-sent.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    pub fn go_online(&self) {
        self.set_online(true);
    }

    pub fn go_offline(&self) {
        self.set_online(false);
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Forwards every transition on `rx` to `on_change` until cancelled
///
/// `on_change` returns `None` once its target is gone, which ends the
/// loop. The loop also ends when every sender has been dropped.
pub async fn watch_connectivity<F, Fut>(
    mut rx: watch::Receiver<bool>,
    shutdown: CancellationToken,
    mut on_change: F,
) where
    F: FnMut(bool) -> Option<Fut>,
    Fut: Future<Output = ()>,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("Connectivity source closed");
                    break;
                }
                let online = *rx.borrow_and_update();
                match on_change(online) {
                    Some(fut) => fut.await,
                    None => break,
                }
            }
        }
    }
    debug!("Connectivity watcher stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_monitor_tracks_state() {
        let monitor = ConnectivityMonitor::default();
        assert!(monitor.is_online());
        monitor.go_offline();
        assert!(!monitor.is_online());
        monitor.go_online();
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_identical_state_is_not_resent() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.go_online();
        assert!(!rx.has_changed().unwrap());

        monitor.go_offline();
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_watch_forwards_transitions() {
        let monitor = ConnectivityMonitor::new(true);
        let token = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let task = tokio::spawn(watch_connectivity(
            monitor.subscribe(),
            token.clone(),
            move |online| {
                sink.lock().unwrap().push(online);
                Some(async {})
            },
        ));

        monitor.go_offline();
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.go_online();
        tokio::time::sleep(Duration::from_millis(20)).await;

        token.cancel();
        task.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_watch_ends_when_sender_dropped() {
        let monitor = ConnectivityMonitor::new(true);
        let rx = monitor.subscribe();
        drop(monitor);

        tokio::time::timeout(
            Duration::from_secs(1),
            watch_connectivity(rx, CancellationToken::new(), |_| Some(async {})),
        )
        .await
        .expect("watcher should stop once the monitor is dropped");
    }
}
