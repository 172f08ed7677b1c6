//! Record-collection path
//!
//! Miners push discovered records into a [`RecordSink`]; the grader pulls the
//! records visible for a height from a [`RecordSource`]. How records travel
//! between nodes is outside this crate, so [`RecordPool`] implements both
//! sides in memory.

use crate::record::OraclePriceRecord;
use crypto_hashes::Hash;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use tracing::trace;

pub trait RecordSink: Send + Sync {
    fn submit(&self, record: OraclePriceRecord);
}

pub trait RecordSource: Send + Sync {
    /// Records observed for `height`, in arrival order.
    fn candidates(&self, height: u64) -> Vec<OraclePriceRecord>;

    /// Drops everything held for heights below `height`.
    fn prune_below(&self, height: u64);
}

/// Default cap on records retained per height.
pub const DEFAULT_MAX_PER_HEIGHT: usize = 10_000;

#[derive(Default)]
struct Window {
    records: Vec<OraclePriceRecord>,
    seen: HashSet<Hash>,
}

/// In-memory record pool keyed by height.
pub struct RecordPool {
    windows: RwLock<BTreeMap<u64, Window>>,
    max_per_height: usize,
}

impl RecordPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_PER_HEIGHT)
    }

    pub fn with_capacity(max_per_height: usize) -> Self {
        Self {
            windows: RwLock::new(BTreeMap::new()),
            max_per_height,
        }
    }

    /// Number of records held for `height`.
    pub fn len_at(&self, height: u64) -> usize {
        self.windows
            .read()
            .get(&height)
            .map(|w| w.records.len())
            .unwrap_or(0)
    }

    pub fn heights(&self) -> Vec<u64> {
        self.windows.read().keys().copied().collect()
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for RecordPool {
    fn submit(&self, record: OraclePriceRecord) {
        let mut windows = self.windows.write();
        let window = windows.entry(record.height()).or_default();
        if window.records.len() >= self.max_per_height {
            trace!(height = record.height(), "record window full, dropping submission");
            return;
        }
        if window.seen.insert(record.digest) {
            window.records.push(record);
        }
    }
}

impl RecordSource for RecordPool {
    fn candidates(&self, height: u64) -> Vec<OraclePriceRecord> {
        self.windows
            .read()
            .get(&height)
            .map(|w| w.records.clone())
            .unwrap_or_default()
    }

    fn prune_below(&self, height: u64) {
        let mut windows = self.windows.write();
        *windows = windows.split_off(&height);
    }
}
