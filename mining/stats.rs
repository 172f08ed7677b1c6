//! Mining counters
//!
//! One [`MiningStats`] is shared by the coordinator and every worker it
//! spawns. Counters are atomics; the per-height activity map and the hash
//! rate sample sit behind short-lived locks.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

struct RateSample {
    at: Instant,
    hashes: u64,
    rate: f64,
}

pub struct MiningStats {
    total_hashes: AtomicU64,
    submissions: AtomicU64,
    cohorts_started: AtomicU64,
    abandoned_workers: AtomicU64,
    skipped_heights: AtomicU64,
    /// Live worker threads per cohort height
    active: Mutex<BTreeMap<u64, usize>>,
    sample: Mutex<RateSample>,
    started: Instant,
}

/// Serializable view of [`MiningStats`].
#[derive(Clone, Debug, Serialize)]
pub struct MiningSnapshot {
    pub total_hashes: u64,
    pub submissions: u64,
    pub cohorts_started: u64,
    pub abandoned_workers: u64,
    pub skipped_heights: u64,
    pub active_workers: BTreeMap<u64, usize>,
    /// Hashes per second over the last sampling interval
    pub hash_rate: f64,
    pub uptime_ms: u64,
}

impl MiningStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            total_hashes: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            cohorts_started: AtomicU64::new(0),
            abandoned_workers: AtomicU64::new(0),
            skipped_heights: AtomicU64::new(0),
            active: Mutex::new(BTreeMap::new()),
            sample: Mutex::new(RateSample {
                at: now,
                hashes: 0,
                rate: 0.0,
            }),
            started: now,
        }
    }

    pub fn add_hashes(&self, count: u64) {
        self.total_hashes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cohort_started(&self) {
        self.cohorts_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn workers_abandoned(&self, count: usize) {
        self.abandoned_workers
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn height_skipped(&self) {
        self.skipped_heights.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self, height: u64) {
        *self.active.lock().entry(height).or_default() += 1;
    }

    pub fn worker_stopped(&self, height: u64) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&height) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&height);
            }
        }
    }

    /// Heights that currently have at least one live worker.
    pub fn active_heights(&self) -> Vec<u64> {
        self.active.lock().keys().copied().collect()
    }

    pub fn active_workers(&self) -> usize {
        self.active.lock().values().sum()
    }

    pub fn total_hashes(&self) -> u64 {
        self.total_hashes.load(Ordering::Relaxed)
    }

    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    pub fn abandoned_workers(&self) -> u64 {
        self.abandoned_workers.load(Ordering::Relaxed)
    }

    /// Closes the current sampling interval and returns its hash rate.
    pub fn sample_hash_rate(&self) -> f64 {
        let hashes = self.total_hashes();
        let mut sample = self.sample.lock();
        let elapsed = sample.at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            sample.rate = hashes.saturating_sub(sample.hashes) as f64 / elapsed;
        }
        sample.at = Instant::now();
        sample.hashes = hashes;
        sample.rate
    }

    pub fn snapshot(&self) -> MiningSnapshot {
        MiningSnapshot {
            total_hashes: self.total_hashes(),
            submissions: self.submissions(),
            cohorts_started: self.cohorts_started.load(Ordering::Relaxed),
            abandoned_workers: self.abandoned_workers(),
            skipped_heights: self.skipped_heights.load(Ordering::Relaxed),
            active_workers: self.active.lock().clone(),
            hash_rate: self.sample.lock().rate,
            uptime_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for MiningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MiningSnapshot {
    pub fn format_summary(&self) -> String {
        format!(
            "Mining: {} hashes, {} submissions, {} cohorts, {} abandoned workers, {:.2} kH/s",
            self.total_hashes,
            self.submissions,
            self.cohorts_started,
            self.abandoned_workers,
            self.hash_rate / 1_000.0
        )
    }
}
