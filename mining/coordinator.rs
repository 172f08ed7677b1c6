//! Mining coordinator
//!
//! Drives one [`WorkerCohort`] per height. On every new height the running
//! cohort is torn down (bounded by the grace period), a fresh template is
//! built and a new cohort is spawned, so at most one cohort can emit at a
//! time.

use crate::cohort::WorkerCohort;
use crate::errors::{MiningError, MiningResult, TemplateError};
use crate::price::PriceSource;
use crate::stats::MiningStats;
use crate::template::MiningTemplate;
use crate::worker::WorkerDescriptor;
use grader::filter::MAX_IDENTITY_LEN;
use grader::{GradeError, Grader};
use opr_core::{Monitor, OprBody, PowHasher, RecordSink};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Upper bound on search threads per cohort.
pub const MAX_WORKERS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CohortState {
    Idle,
    CohortStarting,
    CohortRunning,
    CohortStopping,
}

#[derive(Clone, Debug)]
pub struct MiningCoordinatorConfig {
    pub num_workers: usize,
    pub miner_id: String,
    pub payout_address: String,
    /// How long teardown waits for workers before abandoning them
    pub grace_period: Duration,
    /// Lifetime of a template, measured from when its cohort starts
    pub submission_window: Duration,
    /// How long to wait for the grader to finish the previous height
    pub settle_timeout: Duration,
    /// Longest a price fetch may take before the height is skipped
    pub price_timeout: Duration,
}

impl Default for MiningCoordinatorConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            miner_id: String::new(),
            payout_address: String::new(),
            grace_period: Duration::from_secs(2),
            submission_window: Duration::from_secs(50),
            settle_timeout: Duration::from_secs(2),
            price_timeout: Duration::from_secs(5),
        }
    }
}

impl MiningCoordinatorConfig {
    pub fn validate(&self) -> MiningResult<()> {
        if self.num_workers == 0 || self.num_workers > MAX_WORKERS {
            return Err(MiningError::Configuration(format!(
                "worker count {} outside 1..={}",
                self.num_workers, MAX_WORKERS
            )));
        }
        for (field, value) in [
            ("miner_id", &self.miner_id),
            ("payout_address", &self.payout_address),
        ] {
            if value.is_empty() || value.len() > MAX_IDENTITY_LEN {
                return Err(MiningError::Configuration(format!(
                    "{} must be 1..={} bytes",
                    field, MAX_IDENTITY_LEN
                )));
            }
        }
        if self.grace_period.is_zero() {
            return Err(MiningError::Configuration(
                "grace period must be non-zero".to_string(),
            ));
        }
        if self.submission_window.is_zero() {
            return Err(MiningError::Configuration(
                "submission window must be non-zero".to_string(),
            ));
        }
        if self.price_timeout.is_zero() {
            return Err(MiningError::Configuration(
                "price timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct MiningCoordinator {
    config: MiningCoordinatorConfig,
    descriptors: Vec<WorkerDescriptor>,
    grader: Arc<Grader>,
    monitor: Arc<Monitor>,
    prices: Arc<dyn PriceSource>,
    sink: Arc<dyn RecordSink>,
    hasher: Arc<dyn PowHasher>,
    stats: Arc<MiningStats>,
    state: RwLock<CohortState>,
    next_template_id: AtomicU64,
}

impl MiningCoordinator {
    /// Validates `config` and lays out the worker descriptors. No thread is
    /// spawned until the first height arrives.
    pub fn new(
        config: MiningCoordinatorConfig,
        grader: Arc<Grader>,
        monitor: Arc<Monitor>,
        prices: Arc<dyn PriceSource>,
        sink: Arc<dyn RecordSink>,
        hasher: Arc<dyn PowHasher>,
        stats: Arc<MiningStats>,
    ) -> MiningResult<Self> {
        config.validate()?;
        let descriptors = WorkerDescriptor::partition(config.num_workers);
        Ok(Self {
            config,
            descriptors,
            grader,
            monitor,
            prices,
            sink,
            hasher,
            stats,
            state: RwLock::new(CohortState::Idle),
            next_template_id: AtomicU64::new(1),
        })
    }

    pub fn state(&self) -> CohortState {
        *self.state.read()
    }

    pub fn descriptors(&self) -> &[WorkerDescriptor] {
        &self.descriptors
    }

    pub fn stats(&self) -> Arc<MiningStats> {
        self.stats.clone()
    }

    pub fn miner_id(&self) -> &str {
        &self.config.miner_id
    }

    fn set_state(&self, state: CohortState) {
        *self.state.write() = state;
    }

    /// Coordinator control loop.
    ///
    /// Returns `Ok(())` after `shutdown` fires or the height feed closes, and
    /// [`MiningError::FeedFatal`] when the feed reports a fatal error. Both
    /// signals also interrupt a cohort that is still starting. The running
    /// cohort is torn down before returning in every case.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> MiningResult<()> {
        let mut heights = self.monitor.subscribe();
        let mut fatal = self.monitor.fatal_errors();
        let mut cohort: Option<WorkerCohort> = None;
        log::info!(
            "Mining coordinator started with {} workers as {}",
            self.config.num_workers,
            self.config.miner_id
        );

        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    log::info!("Mining coordinator shutting down");
                    break Ok(());
                }
                err = fatal.wait() => {
                    log::error!("Mining coordinator stopping on feed failure: {}", err);
                    break Err(MiningError::FeedFatal(err));
                }
                next = heights.next() => match next {
                    Some(height) => {
                        self.teardown(cohort.take()).await;
                        // Waiting on the grader or the price source must not
                        // hold back shutdown.
                        tokio::select! {
                            biased;
                            _ = shutdown.recv() => {
                                log::info!("Mining coordinator shutting down while starting height {}", height);
                                break Ok(());
                            }
                            err = fatal.wait() => {
                                log::error!("Mining coordinator stopping on feed failure: {}", err);
                                break Err(MiningError::FeedFatal(err));
                            }
                            started = self.start_cohort(height) => match started {
                                Ok(next) => cohort = next,
                                Err(err) => break Err(err),
                            },
                        }
                    }
                    None => {
                        log::info!("Height feed closed, mining coordinator stopping");
                        break Ok(());
                    }
                },
            }
        };

        self.teardown(cohort.take()).await;
        self.set_state(CohortState::Idle);
        outcome
    }

    async fn teardown(&self, cohort: Option<WorkerCohort>) {
        let Some(cohort) = cohort else {
            return;
        };
        self.set_state(CohortState::CohortStopping);
        cohort.shutdown(self.config.grace_period).await;
        self.set_state(CohortState::Idle);
    }

    async fn start_cohort(&self, height: u64) -> MiningResult<Option<WorkerCohort>> {
        self.set_state(CohortState::CohortStarting);

        if let Some(prev) = height.checked_sub(1) {
            if !self.grader.wait_settled(prev, self.config.settle_timeout).await {
                log::debug!(
                    "Grader has not settled height {}, building template for {} anyway",
                    prev,
                    height
                );
            }
        }

        let template = match self.build_template(height).await {
            Ok(template) => Arc::new(template),
            Err(err) => {
                log::warn!("Skipping height {}: {}", height, err);
                self.stats.height_skipped();
                self.set_state(CohortState::Idle);
                return Ok(None);
            }
        };

        // Nothing below awaits, so an interrupted start never leaves workers.
        match WorkerCohort::spawn(
            template,
            &self.descriptors,
            &self.hasher,
            &self.sink,
            &self.stats,
        ) {
            Ok(cohort) => {
                self.set_state(CohortState::CohortRunning);
                Ok(Some(cohort))
            }
            Err(err) => {
                self.set_state(CohortState::Idle);
                Err(err)
            }
        }
    }

    /// Builds the template for `height` from the price source, the active
    /// rule set and the previous height's winners.
    pub async fn build_template(&self, height: u64) -> Result<MiningTemplate, TemplateError> {
        let rules = self.grader.rules_at(height);
        let (version, assets) = (rules.version, rules.assets);
        let min_difficulty = self.grader.minimum_difficulty(height);

        let prices = timeout(self.config.price_timeout, self.prices.prices(height, assets))
            .await
            .map_err(|_| TemplateError::PriceTimeout(self.config.price_timeout))??;
        if prices.len() != assets.len() {
            return Err(TemplateError::QuoteCount {
                expected: assets.len(),
                got: prices.len(),
            });
        }

        let prev_winners = match height.checked_sub(1) {
            Some(prev) => match self.grader.result_for(prev) {
                Ok(result) => result.short_ids(),
                Err(GradeError::NotFound(_)) => Vec::new(),
                Err(err) => return Err(err.into()),
            },
            None => Vec::new(),
        };

        let body = OprBody {
            height,
            version,
            miner_id: self.config.miner_id.clone(),
            payout_address: self.config.payout_address.clone(),
            prev_winners,
            prices,
        };
        let template_id = self.next_template_id.fetch_add(1, Ordering::Relaxed);
        Ok(MiningTemplate::new(
            template_id,
            body,
            min_difficulty,
            self.config.submission_window,
        ))
    }
}
