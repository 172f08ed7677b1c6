//! Grading counters, owned by whoever constructs the grader.

use crate::filter::RejectReason;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts for a single grading pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassCounts {
    pub candidates: usize,
    pub rejected: BTreeMap<RejectReason, u64>,
    pub cut_by_top_k: usize,
    pub pruned: usize,
    pub winners: usize,
}

impl PassCounts {
    pub fn reject(&mut self, reason: RejectReason) {
        self.add_rejections(reason, 1);
    }

    pub fn add_rejections(&mut self, reason: RejectReason, count: u64) {
        if count > 0 {
            *self.rejected.entry(reason).or_default() += count;
        }
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }

    pub fn rejected_for(&self, reason: RejectReason) -> u64 {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

#[derive(Default)]
pub struct GradingStats {
    heights_graded: AtomicU64,
    heights_skipped: AtomicU64,
    records_seen: AtomicU64,
    winners: AtomicU64,
    rejected: [AtomicU64; RejectReason::ALL.len()],
    pruned: AtomicU64,
    last_graded: Mutex<Option<u64>>,
}

/// Point-in-time copy of [`GradingStats`] for query surfaces.
#[derive(Clone, Debug, Serialize)]
pub struct GradingSnapshot {
    pub heights_graded: u64,
    pub heights_skipped: u64,
    pub records_seen: u64,
    pub winners: u64,
    pub rejected: BTreeMap<String, u64>,
    pub pruned: u64,
    pub last_graded: Option<u64>,
}

impl GradingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&self, height: u64, counts: &PassCounts) {
        self.heights_graded.fetch_add(1, Ordering::Relaxed);
        self.records_seen
            .fetch_add(counts.candidates as u64, Ordering::Relaxed);
        self.winners.fetch_add(counts.winners as u64, Ordering::Relaxed);
        for (reason, n) in &counts.rejected {
            self.rejected[reason.index()].fetch_add(*n, Ordering::Relaxed);
        }
        self.pruned.fetch_add(
            (counts.pruned + counts.cut_by_top_k) as u64,
            Ordering::Relaxed,
        );
        let mut last = self.last_graded.lock();
        *last = Some(last.map_or(height, |prev| prev.max(height)));
    }

    pub fn record_skip(&self) {
        self.heights_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.rejected[reason.index()].load(Ordering::Relaxed)
    }

    pub fn format_rejections(&self) -> u64 {
        RejectReason::ALL
            .iter()
            .filter(|r| r.is_format())
            .map(|r| self.rejected(*r))
            .sum()
    }

    pub fn snapshot(&self) -> GradingSnapshot {
        GradingSnapshot {
            heights_graded: self.heights_graded.load(Ordering::Relaxed),
            heights_skipped: self.heights_skipped.load(Ordering::Relaxed),
            records_seen: self.records_seen.load(Ordering::Relaxed),
            winners: self.winners.load(Ordering::Relaxed),
            rejected: RejectReason::ALL
                .iter()
                .map(|r| (r.to_string(), self.rejected(*r)))
                .collect(),
            pruned: self.pruned.load(Ordering::Relaxed),
            last_graded: *self.last_graded.lock(),
        }
    }
}
