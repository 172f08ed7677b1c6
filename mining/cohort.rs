//! Worker cohorts and their cancellation scope
//!
//! All workers mining one height form a [`WorkerCohort`] and share one
//! [`CohortScope`]. Emission goes through the scope's gate: workers hold the
//! read side while submitting, teardown takes the write side to flip the
//! cancelled flag. Once [`CohortScope::cancel`] returns, nothing from that
//! cohort reaches the sink, whether or not its threads have exited.

use crate::errors::{MiningError, MiningResult};
use crate::stats::MiningStats;
use crate::template::MiningTemplate;
use crate::worker::{SearchWorker, WorkerDescriptor, WorkerReport};
use opr_core::{OraclePriceRecord, PowHasher, RecordSink};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub struct CohortScope {
    height: u64,
    cancelled: AtomicBool,
    gate: RwLock<()>,
}

impl CohortScope {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            cancelled: AtomicBool::new(false),
            gate: RwLock::new(()),
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Closes the gate. Waits for in-flight emissions to finish.
    pub fn cancel(&self) {
        let _gate = self.gate.write();
        self.cancelled.store(true, Ordering::Release);
    }

    /// Submits `record` unless the scope is cancelled. Returns whether the
    /// record was submitted.
    pub fn emit(&self, record: OraclePriceRecord, sink: &dyn RecordSink) -> bool {
        let _gate = self.gate.read();
        if self.is_cancelled() {
            return false;
        }
        sink.submit(record);
        true
    }
}

/// Decrements the live-worker count when a worker thread ends, panics
/// included.
struct ActiveGuard {
    stats: Arc<MiningStats>,
    height: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.stats.worker_stopped(self.height);
    }
}

/// Summary of a cohort teardown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CohortOutcome {
    pub height: u64,
    pub finished: usize,
    pub abandoned: usize,
    pub hashes: u64,
    pub emitted: u64,
}

pub struct WorkerCohort {
    scope: Arc<CohortScope>,
    template: Arc<MiningTemplate>,
    acks: mpsc::UnboundedReceiver<WorkerReport>,
    spawned: usize,
    stats: Arc<MiningStats>,
    started: Instant,
}

impl WorkerCohort {
    /// Spawns one thread per descriptor, all searching `template`.
    ///
    /// If a thread fails to spawn, the workers already started are
    /// cancelled and the error is returned.
    pub fn spawn(
        template: Arc<MiningTemplate>,
        descriptors: &[WorkerDescriptor],
        hasher: &Arc<dyn PowHasher>,
        sink: &Arc<dyn RecordSink>,
        stats: &Arc<MiningStats>,
    ) -> MiningResult<Self> {
        let height = template.height();
        let scope = Arc::new(CohortScope::new(height));
        let (ack_tx, acks) = mpsc::unbounded_channel();

        for descriptor in descriptors {
            let worker = SearchWorker::new(
                *descriptor,
                template.clone(),
                scope.clone(),
                hasher.clone(),
                sink.clone(),
                stats.clone(),
            );
            let ack_tx = ack_tx.clone();
            let guard = ActiveGuard {
                stats: stats.clone(),
                height,
            };
            stats.worker_started(height);

            let spawned = thread::Builder::new()
                .name(format!("opr-miner-{}", descriptor.id))
                .spawn(move || {
                    let report = worker.run();
                    drop(guard);
                    // The cohort may already have given up on this worker.
                    let _ = ack_tx.send(report);
                });
            if let Err(source) = spawned {
                // The closure, and the guard with it, was dropped unrun.
                scope.cancel();
                return Err(MiningError::WorkerSpawn {
                    worker_id: descriptor.id,
                    source,
                });
            }
        }

        stats.cohort_started();
        log::info!(
            "Started {} workers for height {} (template {}, floor {:#018x})",
            descriptors.len(),
            height,
            template.template_id,
            template.min_difficulty
        );
        Ok(Self {
            scope,
            template,
            acks,
            spawned: descriptors.len(),
            stats: stats.clone(),
            started: Instant::now(),
        })
    }

    pub fn height(&self) -> u64 {
        self.scope.height()
    }

    pub fn scope(&self) -> &Arc<CohortScope> {
        &self.scope
    }

    pub fn template(&self) -> &Arc<MiningTemplate> {
        &self.template
    }

    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Cancels the cohort and waits up to `grace` for its workers to
    /// acknowledge. Workers still running afterwards are abandoned; the
    /// closed gate keeps their output out of the sink.
    pub async fn shutdown(mut self, grace: Duration) -> CohortOutcome {
        self.scope.cancel();

        let mut outcome = CohortOutcome {
            height: self.height(),
            ..Default::default()
        };
        let spawned = self.spawned;
        let acks = &mut self.acks;
        let collect = async {
            while outcome.finished < spawned {
                match acks.recv().await {
                    Some(report) => {
                        outcome.finished += 1;
                        outcome.hashes += report.hashes;
                        outcome.emitted += report.emitted;
                    }
                    // Every sender is gone: the rest panicked.
                    None => break,
                }
            }
        };
        let _ = tokio::time::timeout(grace, collect).await;

        outcome.abandoned = spawned - outcome.finished;
        if outcome.abandoned > 0 {
            log::warn!(
                "{} of {} workers for height {} did not stop within {:?}, abandoning them",
                outcome.abandoned,
                spawned,
                outcome.height,
                grace
            );
            self.stats.workers_abandoned(outcome.abandoned);
        }
        log::info!(
            "Cohort for height {} stopped after {:?}: {} hashes, {} submissions",
            outcome.height,
            self.started.elapsed(),
            outcome.hashes,
            outcome.emitted
        );
        outcome
    }
}
