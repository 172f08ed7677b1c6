//! Simulated anchor chain for devnet runs

use opr_core::Monitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Publishes consecutive heights on a fixed interval.
pub struct SimulatedChain {
    monitor: Arc<Monitor>,
    next_height: u64,
    block_interval: Duration,
}

impl SimulatedChain {
    pub fn new(monitor: Arc<Monitor>, start_height: u64, block_interval: Duration) -> Self {
        Self {
            monitor,
            next_height: start_height,
            block_interval,
        }
    }

    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    /// Publishes until `shutdown` fires or the feed has failed.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            start = self.next_height,
            interval_ms = self.block_interval.as_millis() as u64,
            "simulated chain started"
        );
        let mut ticker = interval(self.block_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if self.monitor.is_failed() {
                        break;
                    }
                    if self.monitor.publish(self.next_height) {
                        debug!(height = self.next_height, "published height");
                    }
                    self.next_height += 1;
                }
            }
        }
        info!(last = self.next_height.saturating_sub(1), "simulated chain stopped");
    }
}
