use crate::chain::SimulatedChain;
use crate::config::Config;
use crate::errors::DaemonError;
use crate::ui;
use database::open_store;
use grader::{Grader, GradingStats};
use mining::{MiningCoordinator, MiningStats};
use opr_core::{Blake3Pow, Monitor, PowHasher, RecordPool};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

/// Upper bound on how long stopped tasks may take to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type TaskResult = (&'static str, Result<(), DaemonError>);

pub struct Daemon {
    config: Config,
    shutdown_tx: broadcast::Sender<()>,
    monitor: Arc<Monitor>,
    pool: Arc<RecordPool>,
    grader: Arc<Grader>,
    mining: Option<Arc<MiningCoordinator>>,
    mining_stats: Arc<MiningStats>,
    start_height: u64,
}

impl Daemon {
    /// Create new daemon instance
    pub async fn new(config: Config) -> Result<Self, DaemonError> {
        config.validate()?;
        ui::print_section("Initializing Components");

        let (shutdown_tx, _) = broadcast::channel(1);

        ui::print_component_status("Grading Store", ui::ComponentStatus::Starting);
        info!(backend = ?config.storage, "opening grading store");
        let store = open_store(&config.storage)?;
        ui::print_component_status("Grading Store", ui::ComponentStatus::Running);

        let hasher: Arc<dyn PowHasher> = Arc::new(Blake3Pow);
        let grading_stats = Arc::new(GradingStats::new());
        let grader = Arc::new(Grader::new(
            config.schedule(),
            store,
            hasher.clone(),
            grading_stats,
        )?);
        ui::print_component_status("Grader", ui::ComponentStatus::Running);

        let monitor = Monitor::new();
        let pool = Arc::new(RecordPool::new());
        let mining_stats = Arc::new(MiningStats::new());

        let mining = if config.mining.enabled {
            ui::print_component_status("Mining Coordinator", ui::ComponentStatus::Starting);
            let coordinator = MiningCoordinator::new(
                config.coordinator_config(),
                grader.clone(),
                monitor.clone(),
                Arc::new(config.price_source()),
                pool.clone(),
                hasher,
                mining_stats.clone(),
            )?;
            ui::print_component_status("Mining Coordinator", ui::ComponentStatus::Running);
            Some(Arc::new(coordinator))
        } else {
            None
        };

        // Resume right after the last graded height.
        let start_height = match grader.last_graded() {
            Some(last) => config.feed.start_height.max(last + 1),
            None => config.feed.start_height,
        };

        ui::print_status("✓", "All components initialized", ui::StatusType::Success);
        Ok(Self {
            config,
            shutdown_tx,
            monitor,
            pool,
            grader,
            mining,
            mining_stats,
            start_height,
        })
    }

    pub fn grader(&self) -> Arc<Grader> {
        self.grader.clone()
    }

    pub fn monitor(&self) -> Arc<Monitor> {
        self.monitor.clone()
    }

    pub fn mining_stats(&self) -> Arc<MiningStats> {
        self.mining_stats.clone()
    }

    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    /// Sender that stops a running daemon, as Ctrl+C would.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the daemon until Ctrl+C, a shutdown request, a fatal feed error or
    /// the failure of any task. Every task is stopped before returning.
    pub async fn run(self) -> Result<(), DaemonError> {
        ui::print_section("Starting Services");
        info!("starting oprpad daemon");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut fatal = self.monitor.fatal_errors();
        let start_time = Instant::now();
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();

        {
            let grader = self.grader.clone();
            let monitor = self.monitor.clone();
            let source = self.pool.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move {
                ("grader", grader.run(monitor, source, shutdown).await.map_err(Into::into))
            });
        }
        ui::print_component_status("Grader", ui::ComponentStatus::Running);

        if let Some(mining) = &self.mining {
            let mining = mining.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move { ("mining", mining.run(shutdown).await.map_err(Into::into)) });
            ui::print_component_status("Mining", ui::ComponentStatus::Running);
        } else {
            ui::print_status("ℹ", "Mining not enabled", ui::StatusType::Info);
        }

        {
            let chain = SimulatedChain::new(
                self.monitor.clone(),
                self.start_height,
                self.config.block_interval(),
            );
            let shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move {
                chain.run(shutdown).await;
                ("chain", Ok(()))
            });
        }
        ui::print_component_status("Height Feed", ui::ComponentStatus::Running);

        let watchdog = self.monitor.spawn_watchdog(self.config.watchdog_timeout());
        let status_handle = self.spawn_status(start_time);

        ui::print_status("✓", "oprpad daemon is now running", ui::StatusType::Success);
        ui::print_status("ℹ", "Press Ctrl+C to stop the daemon", ui::StatusType::Info);

        let mut outcome = tokio::select! {
            _ = signal::ctrl_c() => {
                ui::print_status("ℹ", "Received Ctrl+C, shutting down gracefully...", ui::StatusType::Warning);
                info!("received Ctrl+C, shutting down");
                Ok(())
            }
            _ = shutdown_rx.recv() => {
                info!("received shutdown signal");
                Ok(())
            }
            err = fatal.wait() => {
                error!(error = %err, "height feed failed, shutting down");
                Err(DaemonError::Feed(err))
            }
            Some(joined) = tasks.join_next() => {
                let (task, result) = flatten(joined);
                match &result {
                    Ok(()) => warn!(task, "task ended early, shutting down"),
                    Err(err) => error!(task, error = %err, "task failed, shutting down"),
                }
                result
            }
        };

        let _ = self.shutdown_tx.send(());
        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            while let Some(joined) = tasks.join_next().await {
                let (task, result) = flatten(joined);
                match result {
                    Ok(()) => info!(task, "task stopped"),
                    // The first failure is the one reported.
                    Err(err) => {
                        info!(task, error = %err, "task stopped with error");
                        if outcome.is_ok() {
                            outcome = Err(err);
                        }
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("tasks did not stop within {:?}, aborting them", SHUTDOWN_TIMEOUT);
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        // Wait for the aborts to land so no task still holds the store.
        watchdog.abort();
        status_handle.abort();
        let _ = watchdog.await;
        let _ = status_handle.await;
        ui::print_component_status("oprpad", ui::ComponentStatus::Stopped);
        outcome
    }

    fn spawn_status(&self, start_time: Instant) -> tokio::task::JoinHandle<()> {
        let grader = self.grader.clone();
        let monitor = self.monitor.clone();
        let mining_stats = self.mining.as_ref().map(|_| self.mining_stats.clone());
        let every = Duration::from_secs(self.config.status.interval_secs);
        let format = self.config.status.format;

        tokio::spawn(async move {
            let mut ticker = interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mining = mining_stats.as_ref().map(|stats| {
                    stats.sample_hash_rate();
                    stats.snapshot()
                });
                let status = ui::NodeStatus {
                    uptime: start_time.elapsed(),
                    height: monitor.current_height(),
                    grading: grader.stats().snapshot(),
                    mining,
                };
                println!("{}", status.render(format));
            }
        })
    }
}

fn flatten(joined: Result<TaskResult, JoinError>) -> TaskResult {
    match joined {
        Ok(result) => result,
        // A panicked or cancelled task no longer carries its label.
        Err(err) => (
            "runtime",
            Err(DaemonError::Task {
                task: "runtime",
                reason: err.to_string(),
            }),
        ),
    }
}
