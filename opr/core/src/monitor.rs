//! Height and error event feed
//!
//! The monitor is the only input that advances the node. Producers publish
//! new chain heights and, at most once, a fatal error; each consumer holds
//! its own [`HeightSubscription`] and [`FatalSignal`].

use crate::errors::FeedError;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Heights buffered per subscriber before it starts lagging.
const HEIGHT_CHANNEL_CAPACITY: usize = 64;

struct FeedState {
    last_height: Option<u64>,
    last_seen: Instant,
}

pub struct Monitor {
    heights: broadcast::Sender<u64>,
    fatal: watch::Sender<Option<FeedError>>,
    state: Mutex<FeedState>,
}

impl Monitor {
    pub fn new() -> Arc<Self> {
        let (heights, _) = broadcast::channel(HEIGHT_CHANNEL_CAPACITY);
        let (fatal, _) = watch::channel(None);
        Arc::new(Self {
            heights,
            fatal,
            state: Mutex::new(FeedState {
                last_height: None,
                last_seen: Instant::now(),
            }),
        })
    }

    /// Opens an independent stream of height notifications.
    pub fn subscribe(&self) -> HeightSubscription {
        HeightSubscription {
            rx: self.heights.subscribe(),
        }
    }

    pub fn fatal_errors(&self) -> FatalSignal {
        FatalSignal {
            rx: self.fatal.subscribe(),
        }
    }

    /// Announces a new height. Heights that do not advance the feed are
    /// dropped, as is everything after a fatal error.
    pub fn publish(&self, height: u64) -> bool {
        if self.fatal.borrow().is_some() {
            return false;
        }
        let mut state = self.state.lock();
        if matches!(state.last_height, Some(last) if height <= last) {
            warn!(height, last = ?state.last_height, "ignoring non-increasing height");
            return false;
        }
        state.last_height = Some(height);
        state.last_seen = Instant::now();
        drop(state);

        debug!(height, "new height");
        // No subscribers is not an error; they may attach later.
        let _ = self.heights.send(height);
        true
    }

    /// Raises the fatal signal. Only the first call has an effect.
    pub fn fail(&self, err: FeedError) {
        let raised = self.fatal.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(err.clone());
            true
        });
        if raised {
            error!(error = %err, "height feed failed");
        }
    }

    /// Number of live height subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.heights.receiver_count()
    }

    pub fn current_height(&self) -> Option<u64> {
        self.state.lock().last_height
    }

    pub fn is_failed(&self) -> bool {
        self.fatal.borrow().is_some()
    }

    /// Raises [`FeedError::Timeout`] when no height arrives within `timeout`.
    ///
    /// The task ends once the feed has failed or the monitor is dropped.
    pub fn spawn_watchdog(self: &Arc<Self>, timeout: Duration) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let tick = (timeout / 4).max(Duration::from_millis(10));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let Some(monitor) = monitor.upgrade() else {
                    return;
                };
                if monitor.is_failed() {
                    return;
                }
                let idle = monitor.state.lock().last_seen.elapsed();
                if idle > timeout {
                    monitor.fail(FeedError::Timeout(timeout));
                    return;
                }
            }
        })
    }
}

pub struct HeightSubscription {
    rx: broadcast::Receiver<u64>,
}

impl HeightSubscription {
    /// Waits for the next height. A subscriber that fell behind skips to the
    /// newest buffered height. Returns `None` once the monitor is gone.
    pub async fn next(&mut self) -> Option<u64> {
        loop {
            match self.rx.recv().await {
                Ok(height) => return Some(height),
                Err(RecvError::Closed) => return None,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "height subscriber lagged");
                    let mut newest = None;
                    loop {
                        match self.rx.try_recv() {
                            Ok(height) => newest = Some(height),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                        }
                    }
                    if newest.is_some() {
                        return newest;
                    }
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct FatalSignal {
    rx: watch::Receiver<Option<FeedError>>,
}

impl FatalSignal {
    /// Resolves once the feed has failed. Never resolves if the monitor is
    /// dropped without failing.
    pub async fn wait(&mut self) -> FeedError {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(err) = current {
                return err;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn check(&self) -> Option<FeedError> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_increasing_heights() {
        let monitor = Monitor::new();
        let mut a = monitor.subscribe();
        let mut b = monitor.subscribe();

        assert!(monitor.publish(10));
        assert!(!monitor.publish(10));
        assert!(!monitor.publish(9));
        assert!(monitor.publish(11));

        assert_eq!(a.next().await, Some(10));
        assert_eq!(a.next().await, Some(11));
        assert_eq!(b.next().await, Some(10));
        assert_eq!(monitor.current_height(), Some(11));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest() {
        let monitor = Monitor::new();
        let mut sub = monitor.subscribe();
        for h in 1..=(HEIGHT_CHANNEL_CAPACITY as u64 + 10) {
            monitor.publish(h);
        }
        assert_eq!(sub.next().await, Some(HEIGHT_CHANNEL_CAPACITY as u64 + 10));
    }

    #[tokio::test]
    async fn fatal_signal_is_single_shot() {
        let monitor = Monitor::new();
        let mut signal = monitor.fatal_errors();
        monitor.fail(FeedError::Disconnected("first".into()));
        monitor.fail(FeedError::Disconnected("second".into()));

        assert_eq!(signal.wait().await, FeedError::Disconnected("first".into()));
        assert!(!monitor.publish(1));
    }

    #[tokio::test]
    async fn watchdog_fires_without_heights() {
        let monitor = Monitor::new();
        let mut signal = monitor.fatal_errors();
        let timeout = Duration::from_millis(50);
        monitor.spawn_watchdog(timeout);

        let err = tokio::time::timeout(Duration::from_secs(2), signal.wait())
            .await
            .expect("watchdog should fire");
        assert_eq!(err, FeedError::Timeout(timeout));
    }
}
