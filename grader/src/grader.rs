//! Grader entry points and control loop

use crate::errors::{GradeError, GraderResult};
use crate::filter::{check_format, RejectReason};
use crate::ranking::{dedup_by_miner, prune_outliers, top_k, Scored};
use crate::stats::{GradingStats, PassCounts};
use database::GradeStore;
use opr_core::{
    GradingResult, Monitor, OraclePriceRecord, PowHasher, ProtocolSchedule, RecordSource,
    RuleSet, Winner,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

pub struct Grader {
    schedule: ProtocolSchedule,
    store: Arc<dyn GradeStore>,
    hasher: Arc<dyn PowHasher>,
    stats: Arc<GradingStats>,
    /// Held for the whole of a grading pass, which makes the grader the
    /// store's single writer.
    last_graded: Mutex<Option<u64>>,
    /// Highest height the grader is done with, graded or skipped.
    settled: watch::Sender<Option<u64>>,
}

impl Grader {
    /// Creates a grader that resumes after the latest stored result.
    pub fn new(
        schedule: ProtocolSchedule,
        store: Arc<dyn GradeStore>,
        hasher: Arc<dyn PowHasher>,
        stats: Arc<GradingStats>,
    ) -> GraderResult<Self> {
        let last = store.latest()?.map(|(height, _)| height);
        if let Some(height) = last {
            info!(height, "resuming grader after stored result");
        }
        let (settled, _) = watch::channel(last);
        Ok(Self {
            schedule,
            store,
            hasher,
            stats,
            last_graded: Mutex::new(last),
            settled,
        })
    }

    /// Grades `candidates` for `height` and persists the result.
    ///
    /// Fails with [`GradeError::InvalidInput`] if `candidates` is empty or
    /// `height` does not come after the last graded height. A set in which
    /// every record is rejected still produces (and persists) a result with
    /// no winners.
    pub fn grade(
        &self,
        height: u64,
        candidates: Vec<OraclePriceRecord>,
    ) -> GraderResult<GradingResult> {
        if candidates.is_empty() {
            return Err(GradeError::InvalidInput(format!(
                "empty candidate set for height {}",
                height
            )));
        }
        let mut last = self.last_graded.lock();
        if let Some(prev) = *last {
            if height <= prev {
                return Err(GradeError::InvalidInput(format!(
                    "height {} is not after last graded height {}",
                    height, prev
                )));
            }
        }

        let rules = self.schedule.rules_at(height);
        let expected_prev = self.previous_winners(height)?;
        let (result, counts) = self.grade_pass(height, rules, &expected_prev, candidates);

        self.store.put(height, &result)?;
        *last = Some(height);
        drop(last);

        self.stats.record_pass(height, &counts);
        self.mark_settled(height);
        info!(
            height,
            version = rules.version,
            candidates = counts.candidates,
            rejected = counts.rejected_total(),
            pruned = counts.pruned + counts.cut_by_top_k,
            winners = counts.winners,
            "graded height"
        );
        Ok(result)
    }

    fn grade_pass(
        &self,
        height: u64,
        rules: &RuleSet,
        expected_prev: &[String],
        candidates: Vec<OraclePriceRecord>,
    ) -> (GradingResult, PassCounts) {
        let mut counts = PassCounts {
            candidates: candidates.len(),
            ..Default::default()
        };
        let hasher = self.hasher.as_ref();

        let mut admitted = Vec::with_capacity(candidates.len());
        for record in candidates {
            if let Err(reason) = check_format(&record, height, rules, expected_prev, hasher) {
                trace!(height, miner = record.miner_id(), %reason, "record rejected");
                counts.reject(reason);
                continue;
            }
            let difficulty = record.difficulty(hasher);
            if difficulty < rules.min_difficulty {
                counts.reject(RejectReason::Difficulty);
                continue;
            }
            admitted.push(Scored { record, difficulty });
        }

        let (mut ranked, superseded) = dedup_by_miner(admitted);
        counts.add_rejections(RejectReason::Superseded, superseded as u64);
        counts.cut_by_top_k = top_k(&mut ranked, rules.k_max);
        counts.pruned = prune_outliers(&mut ranked, rules.k_win, &rules.deviation);

        let winners: Vec<Winner> = ranked
            .into_iter()
            .enumerate()
            .map(|(idx, scored)| {
                let rank = idx as u32 + 1;
                Winner {
                    rank,
                    tier: rules.tier_for_rank(rank),
                    reward: rules.reward_for_rank(rank),
                    difficulty: scored.difficulty,
                    record: scored.record,
                }
            })
            .collect();
        counts.winners = winners.len();

        let result = GradingResult {
            height,
            version: rules.version,
            winners,
        };
        (result, counts)
    }

    /// Short ids records at `height` must reference.
    pub fn previous_winners(&self, height: u64) -> GraderResult<Vec<String>> {
        let Some(prev) = height.checked_sub(1) else {
            return Ok(Vec::new());
        };
        Ok(self
            .store
            .get(prev)?
            .map(|result| result.short_ids())
            .unwrap_or_default())
    }

    pub fn result_for(&self, height: u64) -> GraderResult<GradingResult> {
        self.store.get(height)?.ok_or(GradeError::NotFound(height))
    }

    pub fn latest(&self) -> GraderResult<Option<(u64, GradingResult)>> {
        Ok(self.store.latest()?)
    }

    pub fn minimum_difficulty(&self, height: u64) -> u64 {
        self.schedule.min_difficulty(height)
    }

    pub fn rules_at(&self, height: u64) -> &RuleSet {
        self.schedule.rules_at(height)
    }

    pub fn last_graded(&self) -> Option<u64> {
        *self.last_graded.lock()
    }

    pub fn stats(&self) -> Arc<GradingStats> {
        self.stats.clone()
    }

    fn mark_settled(&self, height: u64) {
        self.settled.send_if_modified(|settled| {
            if matches!(*settled, Some(h) if h >= height) {
                return false;
            }
            *settled = Some(height);
            true
        });
    }

    /// Waits until the grader is done with `height`, or `timeout` passes.
    pub async fn wait_settled(&self, height: u64, timeout: Duration) -> bool {
        let mut rx = self.settled.subscribe();
        let reached = |v: &Option<u64>| matches!(*v, Some(h) if h >= height);
        let wait = async {
            loop {
                let done = reached(&*rx.borrow_and_update());
                if done {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    /// Grader control loop.
    ///
    /// Each new height `H` closes the window for `H - 1`, which is graded
    /// from the records visible in `source`. Returns when `shutdown` fires or
    /// the feed closes; persistence failures and the feed's fatal signal are
    /// returned as errors.
    pub async fn run(
        self: Arc<Self>,
        monitor: Arc<Monitor>,
        source: Arc<dyn RecordSource>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> GraderResult<()> {
        let mut heights = monitor.subscribe();
        let mut fatal = monitor.fatal_errors();
        info!("grader started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("grader shutting down");
                    return Ok(());
                }
                err = fatal.wait() => {
                    warn!(error = %err, "grader stopping on feed failure");
                    return Err(GradeError::FeedFatal(err));
                }
                next = heights.next() => match next {
                    Some(height) => self.on_height(height, source.as_ref())?,
                    None => {
                        info!("height feed closed, grader stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn on_height(&self, height: u64, source: &dyn RecordSource) -> GraderResult<()> {
        let Some(target) = height.checked_sub(1) else {
            return Ok(());
        };
        if matches!(self.last_graded(), Some(last) if target <= last) {
            debug!(height = target, "already graded");
            self.mark_settled(target);
            return Ok(());
        }

        let candidates = source.candidates(target);
        if candidates.is_empty() {
            debug!(height = target, "no candidates, nothing to grade");
            self.stats.record_skip();
        } else {
            match self.grade(target, candidates) {
                Ok(_) => {}
                Err(GradeError::InvalidInput(reason)) => {
                    warn!(height = target, %reason, "skipping height");
                }
                Err(err) => return Err(err),
            }
        }
        self.mark_settled(target);
        source.prune_below(height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::MemoryGradeStore;
    use opr_core::testing::{flat_prices, record, record_with_prev, NonceDifficulty};
    use opr_core::{FeedError, Network, RecordPool, RecordSink};

    fn grader_with(store: Arc<dyn GradeStore>) -> Grader {
        Grader::new(
            ProtocolSchedule::for_network(Network::DevNet),
            store,
            Arc::new(NonceDifficulty),
            Arc::new(GradingStats::new()),
        )
        .unwrap()
    }

    fn grader() -> Grader {
        grader_with(Arc::new(MemoryGradeStore::new()))
    }

    fn v1() -> RuleSet {
        RuleSet::v1(0)
    }

    fn records(height: u64, count: u64) -> Vec<OraclePriceRecord> {
        (0..count)
            .map(|i| record(&v1(), height, &format!("miner-{}", i), flat_prices(&v1(), 2), 100 + i))
            .collect()
    }

    #[test]
    fn empty_candidate_set_is_rejected() {
        let g = grader();
        assert!(matches!(g.grade(10, Vec::new()), Err(GradeError::InvalidInput(_))));
        assert_eq!(g.last_graded(), None);
    }

    #[test]
    fn highest_height_is_gradable() {
        let g = grader();
        let v2 = RuleSet::v2(0);
        let top = record(&v2, u64::MAX, "m", flat_prices(&v2, 1), 1 << 40);
        let result = g.grade(u64::MAX, vec![top]).unwrap();
        assert_eq!(result.winners.len(), 1);
        assert_eq!(g.last_graded(), Some(u64::MAX));
        assert_eq!(g.stats().snapshot().last_graded, Some(u64::MAX));
    }

    #[test]
    fn heights_must_advance() {
        let g = grader();
        g.grade(10, records(10, 3)).unwrap();
        assert!(matches!(g.grade(10, records(10, 3)), Err(GradeError::InvalidInput(_))));
        assert!(matches!(g.grade(9, records(9, 3)), Err(GradeError::InvalidInput(_))));
        assert_eq!(g.last_graded(), Some(10));
    }

    #[test]
    fn all_rejected_persists_empty_result() {
        let g = grader();
        let bad = record(&RuleSet::v2(0), 10, "m", flat_prices(&RuleSet::v2(0), 1), 5);
        let result = g.grade(10, vec![bad]).unwrap();
        assert!(!result.has_winners());
        assert_eq!(g.result_for(10).unwrap(), result);
        assert_eq!(g.stats().rejected(RejectReason::Version), 1);
    }

    #[test]
    fn missing_height_is_not_found() {
        let g = grader();
        assert!(matches!(g.result_for(3), Err(GradeError::NotFound(3))));
    }

    #[test]
    fn winners_carry_rank_and_reward() {
        let g = grader();
        let result = g.grade(10, records(10, 3)).unwrap();
        let ranks: Vec<u32> = result.winners.iter().map(|w| w.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(result.winners[0].record.miner_id(), "miner-2");
        assert_eq!(result.winners[0].reward, 800 * 100_000_000);
        assert_eq!(result.winners[1].reward, 600 * 100_000_000);
        assert_eq!(result.winners[2].reward, 450 * 100_000_000);
    }

    #[test]
    fn resumes_after_stored_height() {
        let store: Arc<dyn GradeStore> = Arc::new(MemoryGradeStore::new());
        grader_with(store.clone()).grade(7, records(7, 2)).unwrap();

        let resumed = grader_with(store);
        assert_eq!(resumed.last_graded(), Some(7));
        assert!(resumed.grade(7, records(7, 2)).is_err());
        assert!(resumed.grade(8, records(8, 2)).is_ok());
    }

    #[test]
    fn records_must_reference_previous_winners() {
        let g = grader();
        let first = g.grade(20, records(20, 2)).unwrap();
        let expected = first.short_ids();
        assert_eq!(g.previous_winners(21).unwrap(), expected);

        let linked = record_with_prev(&v1(), 21, "linked", flat_prices(&v1(), 2), 9, expected);
        let stale = record(&v1(), 21, "stale", flat_prices(&v1(), 2), 50);
        let result = g.grade(21, vec![linked, stale]).unwrap();

        assert_eq!(result.winners.len(), 1);
        assert_eq!(result.winners[0].record.miner_id(), "linked");
        assert_eq!(g.stats().rejected(RejectReason::PrevWinners), 1);
    }

    #[test]
    fn minimum_difficulty_follows_schedule() {
        let g = grader();
        assert_eq!(g.minimum_difficulty(999), 0);
        assert_eq!(g.minimum_difficulty(1_000), 1 << 40);
        assert_eq!(g.rules_at(1_000).version, 2);
    }

    #[tokio::test]
    async fn wait_settled_times_out_then_resolves() {
        let g = Arc::new(grader());
        assert!(!g.wait_settled(5, Duration::from_millis(20)).await);

        let waiter = {
            let g = g.clone();
            tokio::spawn(async move { g.wait_settled(5, Duration::from_secs(5)).await })
        };
        g.grade(5, records(5, 1)).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn run_grades_previous_height_on_each_new_height() {
        let g = Arc::new(grader());
        let monitor = Monitor::new();
        let pool = Arc::new(RecordPool::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(g.clone().run(monitor.clone(), pool.clone(), shutdown_rx));
        tokio::task::yield_now().await;

        for r in records(30, 4) {
            pool.submit(r);
        }
        monitor.publish(30);
        monitor.publish(31);

        assert!(g.wait_settled(30, Duration::from_secs(5)).await);
        assert_eq!(g.result_for(30).unwrap().winners.len(), 4);
        assert_eq!(pool.len_at(30), 0);
        assert_eq!(g.stats().snapshot().heights_skipped, 1);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_feed_failure() {
        let g = Arc::new(grader());
        let monitor = Monitor::new();
        let pool = Arc::new(RecordPool::new());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(g.run(monitor.clone(), pool, shutdown_rx));
        monitor.fail(FeedError::Disconnected("socket closed".to_string()));

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Err(GradeError::FeedFatal(FeedError::Disconnected(_)))));
    }
}
