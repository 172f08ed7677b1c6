//! Coordinator tests
//!
//! These drive the full coordinator against a real grader, a recording sink
//! and a monitor fed by hand.

#[cfg(test)]
mod tests {
    use crate::coordinator::{CohortState, MiningCoordinator, MiningCoordinatorConfig};
    use crate::errors::{MiningError, TemplateError};
    use crate::price::{FixedPriceSource, PriceError, PriceSource};
    use crate::stats::MiningStats;
    use database::MemoryGradeStore;
    use grader::{Grader, GradingStats};
    use opr_core::testing::{flat_prices, record};
    use opr_core::{
        Blake3Pow, FeedError, Monitor, Network, OraclePriceRecord, ProtocolSchedule, RecordSink,
        RuleSet, PRICE_PRECISION,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<OraclePriceRecord>>,
    }

    impl RecordingSink {
        fn len(&self) -> usize {
            self.records.lock().len()
        }

        fn heights(&self) -> Vec<u64> {
            self.records.lock().iter().map(|r| r.height()).collect()
        }

        fn count_at(&self, height: u64) -> usize {
            self.records
                .lock()
                .iter()
                .filter(|r| r.height() == height)
                .count()
        }
    }

    impl RecordSink for RecordingSink {
        fn submit(&self, record: OraclePriceRecord) {
            self.records.lock().push(record);
        }
    }

    struct Harness {
        coordinator: Arc<MiningCoordinator>,
        monitor: Arc<Monitor>,
        grader: Arc<Grader>,
        sink: Arc<RecordingSink>,
        stats: Arc<MiningStats>,
        shutdown: broadcast::Sender<()>,
    }

    impl Harness {
        /// Starts the control loop and waits until it listens for heights.
        async fn spawn_run(&self) -> JoinHandle<Result<(), MiningError>> {
            let run = tokio::spawn(self.coordinator.clone().run(self.shutdown.subscribe()));
            let monitor = self.monitor.clone();
            assert!(wait_until(|| monitor.subscriber_count() > 0, Duration::from_secs(5)).await);
            run
        }
    }

    fn config(num_workers: usize) -> MiningCoordinatorConfig {
        MiningCoordinatorConfig {
            num_workers,
            miner_id: "node-a".to_string(),
            payout_address: "node-a-payout".to_string(),
            grace_period: Duration::from_secs(2),
            submission_window: Duration::from_secs(60),
            settle_timeout: Duration::from_millis(10),
            price_timeout: Duration::from_secs(10),
        }
    }

    /// Answers only after `delay`, like an exchange that has stopped replying.
    struct StalledPrices {
        delay: Duration,
    }

    #[async_trait]
    impl PriceSource for StalledPrices {
        async fn prices(&self, _height: u64, assets: &[&str]) -> Result<Vec<u64>, PriceError> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![PRICE_PRECISION; assets.len()])
        }
    }

    fn grader() -> Arc<Grader> {
        Arc::new(
            Grader::new(
                ProtocolSchedule::for_network(Network::DevNet),
                Arc::new(MemoryGradeStore::new()),
                Arc::new(Blake3Pow),
                Arc::new(GradingStats::new()),
            )
            .unwrap(),
        )
    }

    fn harness_with(config: MiningCoordinatorConfig, prices: Arc<dyn PriceSource>) -> Harness {
        let monitor = Monitor::new();
        let grader = grader();
        let sink = Arc::new(RecordingSink::default());
        let stats = Arc::new(MiningStats::new());
        let coordinator = MiningCoordinator::new(
            config,
            grader.clone(),
            monitor.clone(),
            prices,
            sink.clone(),
            Arc::new(Blake3Pow),
            stats.clone(),
        )
        .unwrap();
        let (shutdown, _) = broadcast::channel(1);
        Harness {
            coordinator: Arc::new(coordinator),
            monitor,
            grader,
            sink,
            stats,
            shutdown,
        }
    }

    fn harness(num_workers: usize) -> Harness {
        harness_with(
            config(num_workers),
            Arc::new(FixedPriceSource::uniform(3 * PRICE_PRECISION)),
        )
    }

    async fn wait_until(mut cond: impl FnMut() -> bool, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    // ==================== Configuration Tests ====================

    #[test]
    fn init_rejects_invalid_configuration() {
        let cases = vec![
            MiningCoordinatorConfig { num_workers: 0, ..config(1) },
            MiningCoordinatorConfig { num_workers: 1025, ..config(1) },
            MiningCoordinatorConfig { miner_id: String::new(), ..config(1) },
            MiningCoordinatorConfig { payout_address: "x".repeat(65), ..config(1) },
            MiningCoordinatorConfig { grace_period: Duration::ZERO, ..config(1) },
            MiningCoordinatorConfig { price_timeout: Duration::ZERO, ..config(1) },
        ];

        for bad in cases {
            let result = MiningCoordinator::new(
                bad.clone(),
                grader(),
                Monitor::new(),
                Arc::new(FixedPriceSource::uniform(1)),
                Arc::new(RecordingSink::default()),
                Arc::new(Blake3Pow),
                Arc::new(MiningStats::new()),
            );
            assert!(
                matches!(result, Err(MiningError::Configuration(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn init_lays_out_workers_without_spawning() {
        let h = harness(4);
        let strides: Vec<u64> = h.coordinator.descriptors().iter().map(|d| d.stride).collect();
        assert_eq!(strides, vec![4; 4]);
        assert_eq!(h.coordinator.state(), CohortState::Idle);
        assert_eq!(h.stats.active_workers(), 0);
    }

    // ==================== Template Tests ====================

    #[tokio::test]
    async fn template_links_previous_winners() {
        let h = harness(1);
        let rules = RuleSet::v1(0);
        let previous = h
            .grader
            .grade(14, vec![record(&rules, 14, "other", flat_prices(&rules, 3), 5)])
            .unwrap();

        let template = h.coordinator.build_template(15).await.unwrap();
        assert_eq!(template.height(), 15);
        assert_eq!(template.version(), 1);
        assert_eq!(template.body.prev_winners, previous.short_ids());
        assert_eq!(template.body.prices.len(), rules.asset_count());
        assert_eq!(template.min_difficulty, 0);
    }

    #[tokio::test]
    async fn template_follows_rule_activation() {
        let h = harness(1);
        let template = h.coordinator.build_template(1_000).await.unwrap();
        assert_eq!(template.version(), 2);
        assert_eq!(template.body.prices.len(), RuleSet::v2(0).asset_count());
        assert_eq!(template.min_difficulty, 1 << 40);
        assert!(template.body.prev_winners.is_empty());
    }

    #[tokio::test]
    async fn template_ids_increase_per_coordinator() {
        let h = harness(1);
        let first = h.coordinator.build_template(15).await.unwrap();
        let second = h.coordinator.build_template(16).await.unwrap();
        assert!(second.template_id > first.template_id);
        assert_eq!(harness(1).coordinator.build_template(15).await.unwrap().template_id, 1);
    }

    #[tokio::test]
    async fn stalled_price_source_times_out() {
        let h = harness_with(
            MiningCoordinatorConfig {
                price_timeout: Duration::from_millis(50),
                ..config(1)
            },
            Arc::new(StalledPrices {
                delay: Duration::from_secs(3),
            }),
        );
        let started = Instant::now();
        let err = h.coordinator.build_template(7).await.unwrap_err();
        assert!(matches!(err, TemplateError::PriceTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    // ==================== Control Loop Tests ====================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cohorts_never_overlap() {
        let h = harness(3);
        let run = h.spawn_run().await;

        for height in 10..14 {
            assert!(h.monitor.publish(height));
            let sink = h.sink.clone();
            assert!(wait_until(|| sink.count_at(height) > 0, Duration::from_secs(5)).await);
            assert_eq!(h.stats.active_heights(), vec![height]);
            let coordinator = h.coordinator.clone();
            assert!(
                wait_until(
                    || coordinator.state() == CohortState::CohortRunning,
                    Duration::from_secs(5)
                )
                .await
            );
        }

        h.shutdown.send(()).unwrap();
        run.await.unwrap().unwrap();

        let heights = h.sink.heights();
        assert!(heights.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(h.coordinator.state(), CohortState::Idle);
        assert!(h.stats.active_heights().is_empty());
        assert_eq!(h.stats.snapshot().cohorts_started, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fatal_signal_stops_five_workers_within_grace() {
        let grace = Duration::from_millis(500);
        let h = harness_with(
            MiningCoordinatorConfig {
                grace_period: grace,
                ..config(5)
            },
            Arc::new(FixedPriceSource::uniform(3 * PRICE_PRECISION)),
        );
        let run = h.spawn_run().await;

        h.monitor.publish(20);
        let sink = h.sink.clone();
        assert!(wait_until(|| sink.len() >= 5, Duration::from_secs(5)).await);
        assert_eq!(h.stats.active_workers(), 5);

        let raised = Instant::now();
        h.monitor
            .fail(FeedError::Disconnected("chain bridge lost".to_string()));
        let outcome = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run returned")
            .unwrap();
        assert!(raised.elapsed() < grace + Duration::from_millis(250));
        assert!(matches!(outcome, Err(MiningError::FeedFatal(_))));

        let emitted = h.sink.len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.sink.len(), emitted);
        assert!(h.stats.active_heights().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_returns_ok_after_teardown() {
        let h = harness(2);
        let run = h.spawn_run().await;

        h.monitor.publish(3);
        let stats = h.stats.clone();
        assert!(wait_until(|| stats.active_workers() == 2, Duration::from_secs(5)).await);

        h.shutdown.send(()).unwrap();
        run.await.unwrap().unwrap();
        assert_eq!(h.stats.active_workers(), 0);
        assert_eq!(h.stats.abandoned_workers(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn price_failure_skips_height() {
        let h = harness_with(config(2), Arc::new(FixedPriceSource::default()));
        let run = h.spawn_run().await;

        h.monitor.publish(5);
        let stats = h.stats.clone();
        assert!(wait_until(|| stats.snapshot().skipped_heights == 1, Duration::from_secs(5)).await);
        assert_eq!(h.sink.len(), 0);
        assert_eq!(h.coordinator.state(), CohortState::Idle);

        h.shutdown.send(()).unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fatal_signal_interrupts_a_starting_cohort() {
        let grace = Duration::from_millis(500);
        let h = harness_with(
            MiningCoordinatorConfig {
                grace_period: grace,
                ..config(2)
            },
            Arc::new(StalledPrices {
                delay: Duration::from_secs(3),
            }),
        );
        let run = h.spawn_run().await;

        h.monitor.publish(5);
        let coordinator = h.coordinator.clone();
        assert!(
            wait_until(
                || coordinator.state() == CohortState::CohortStarting,
                Duration::from_secs(5)
            )
            .await
        );

        let raised = Instant::now();
        h.monitor
            .fail(FeedError::Disconnected("chain bridge lost".to_string()));
        let outcome = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run returned")
            .unwrap();
        assert!(raised.elapsed() < grace);
        assert!(matches!(outcome, Err(MiningError::FeedFatal(_))));
        assert_eq!(h.stats.snapshot().cohorts_started, 0);
        assert_eq!(h.coordinator.state(), CohortState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_interrupts_a_starting_cohort() {
        let h = harness_with(
            config(2),
            Arc::new(StalledPrices {
                delay: Duration::from_secs(3),
            }),
        );
        let run = h.spawn_run().await;

        h.monitor.publish(5);
        let coordinator = h.coordinator.clone();
        assert!(
            wait_until(
                || coordinator.state() == CohortState::CohortStarting,
                Duration::from_secs(5)
            )
            .await
        );

        h.shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("run returned")
            .unwrap()
            .unwrap();
        assert_eq!(h.stats.active_workers(), 0);
    }
}
