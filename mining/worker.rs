//! Search workers
//!
//! A [`SearchWorker`] runs on its own OS thread and walks a disjoint slice of
//! the nonce space for one template. Every improvement on its own best
//! difficulty that clears the floor is emitted through the cohort scope.

use crate::cohort::CohortScope;
use crate::stats::MiningStats;
use crate::template::MiningTemplate;
use opr_core::{PowHasher, RecordSink};
use std::sync::Arc;

/// Nonces tried between cancellation and cutoff checks.
pub const NONCE_BATCH: u64 = 1_000;

/// A worker's share of the nonce space: `nonce_offset + k * stride`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub id: usize,
    pub nonce_offset: u64,
    pub stride: u64,
}

impl WorkerDescriptor {
    /// Interleaved partition of the nonce space across `num_workers`.
    pub fn partition(num_workers: usize) -> Vec<Self> {
        (0..num_workers)
            .map(|id| Self {
                id,
                nonce_offset: id as u64,
                stride: num_workers as u64,
            })
            .collect()
    }

    /// The `k`-th nonce of this slice, or `None` past the end of the space.
    pub fn nonce_at(&self, k: u64) -> Option<u64> {
        k.checked_mul(self.stride)?.checked_add(self.nonce_offset)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    Cutoff,
    Exhausted,
}

/// Sent back to the cohort when a worker ends.
#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub height: u64,
    pub hashes: u64,
    pub emitted: u64,
    pub best_difficulty: Option<u64>,
    pub reason: StopReason,
}

pub struct SearchWorker {
    descriptor: WorkerDescriptor,
    template: Arc<MiningTemplate>,
    scope: Arc<CohortScope>,
    hasher: Arc<dyn PowHasher>,
    sink: Arc<dyn RecordSink>,
    stats: Arc<MiningStats>,
}

impl SearchWorker {
    pub fn new(
        descriptor: WorkerDescriptor,
        template: Arc<MiningTemplate>,
        scope: Arc<CohortScope>,
        hasher: Arc<dyn PowHasher>,
        sink: Arc<dyn RecordSink>,
        stats: Arc<MiningStats>,
    ) -> Self {
        Self {
            descriptor,
            template,
            scope,
            hasher,
            sink,
            stats,
        }
    }

    /// Searches until cancelled, past the cutoff, or out of nonces.
    /// Blocking; meant to own a thread.
    pub fn run(self) -> WorkerReport {
        let id = self.descriptor.id;
        let height = self.template.height();
        log::debug!("Worker {} started on height {}", id, height);

        let mut k: u64 = 0;
        let mut hashes: u64 = 0;
        let mut unreported: u64 = 0;
        let mut emitted: u64 = 0;
        let mut best: Option<u64> = None;
        let pow = self.hasher.prepare(&self.template.opr_hash);

        let reason = loop {
            if k % NONCE_BATCH == 0 {
                self.stats.add_hashes(unreported);
                unreported = 0;
                if self.scope.is_cancelled() {
                    break StopReason::Cancelled;
                }
                if self.template.is_expired() {
                    break StopReason::Cutoff;
                }
            }
            let Some(nonce) = self.descriptor.nonce_at(k) else {
                break StopReason::Exhausted;
            };
            k += 1;

            let digest = pow.digest(nonce);
            let difficulty = self.hasher.difficulty(&digest);
            hashes += 1;
            unreported += 1;

            if difficulty < self.template.min_difficulty
                || best.map_or(false, |b| difficulty <= b)
            {
                continue;
            }
            best = Some(difficulty);

            let record = self.template.record_for(nonce, digest);
            if !self.scope.emit(record, self.sink.as_ref()) {
                break StopReason::Cancelled;
            }
            emitted += 1;
            self.stats.record_submission();
            log::debug!(
                "Worker {} emitted height {} nonce {} difficulty {:#018x}",
                id,
                height,
                nonce,
                difficulty
            );
        };
        self.stats.add_hashes(unreported);

        log::debug!(
            "Worker {} stopped on height {} ({:?}) after {} hashes",
            id,
            height,
            reason,
            hashes
        );
        WorkerReport {
            worker_id: id,
            height,
            hashes,
            emitted,
            best_difficulty: best,
            reason,
        }
    }
}
