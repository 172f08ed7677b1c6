//! Daemon configuration
//!
//! A TOML file (or the per-network defaults) layered with CLI overrides.
//! Everything is checked once by [`Config::validate`] before any component
//! starts.

use crate::cli::Args;
use database::StoreBackend;
use grader::filter::MAX_IDENTITY_LEN;
use mining::{FixedPriceSource, MiningCoordinatorConfig, MAX_WORKERS};
use opr_core::{Network, ProtocolSchedule, PRICE_PRECISION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Invalid [{section}] settings: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}

fn invalid(section: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        section,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub storage: StoreBackend,
    pub feed: FeedConfig,
    pub mining: MiningConfig,
    #[serde(default)]
    pub prices: PriceConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// First height the simulated chain publishes
    pub start_height: u64,
    pub block_interval_ms: u64,
    /// The feed is declared dead after this long without a new height
    pub watchdog_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    pub enabled: bool,
    pub miner_id: String,
    pub payout_address: String,
    pub num_threads: usize,
    pub grace_period_ms: u64,
    pub submission_window_ms: u64,
    pub settle_timeout_ms: u64,
    #[serde(default = "default_price_timeout_ms")]
    pub price_timeout_ms: u64,
}

fn default_price_timeout_ms() -> u64 {
    5_000
}

/// The feed is declared dead after this many silent block intervals.
const WATCHDOG_INTERVALS: u64 = 3;

/// Templates stop accepting work a tenth of an interval before the next block.
fn submission_window_for(block_interval_ms: u64) -> u64 {
    block_interval_ms.saturating_sub(block_interval_ms / 10)
}

/// Quotes in whole units; converted to fixed point when mining starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceConfig {
    pub default: Option<f64>,
    #[serde(default)]
    pub quotes: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub interval_secs: u64,
    #[serde(default)]
    pub format: StatusFormat,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            format: StatusFormat::Text,
        }
    }
}

impl Config {
    /// Loads a configuration file. A missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Default configuration for a network.
    pub fn for_network(network: Network) -> Self {
        let data_dir = PathBuf::from("./data").join(network.to_string());
        let block_interval_ms = match network {
            // Anchor blocks arrive roughly every ten minutes.
            Network::MainNet | Network::TestNet => 600_000,
            Network::DevNet => 5_000,
        };
        let devnet = network == Network::DevNet;

        Self {
            network: NetworkConfig { network },
            storage: StoreBackend::RocksDb {
                path: data_dir.join("grades"),
            },
            feed: FeedConfig {
                start_height: 1,
                block_interval_ms,
                watchdog_timeout_ms: block_interval_ms * WATCHDOG_INTERVALS,
            },
            mining: MiningConfig {
                enabled: devnet,
                miner_id: if devnet { "devnet-miner".to_string() } else { String::new() },
                payout_address: if devnet { "devnet-payout".to_string() } else { String::new() },
                num_threads: num_cpus::get().min(MAX_WORKERS),
                grace_period_ms: 2_000,
                submission_window_ms: submission_window_for(block_interval_ms),
                settle_timeout_ms: 2_000,
                price_timeout_ms: default_price_timeout_ms(),
            },
            prices: PriceConfig {
                default: devnet.then_some(1.0),
                quotes: BTreeMap::new(),
            },
            status: StatusConfig::default(),
        }
    }

    /// Override config with CLI arguments
    pub fn apply_cli_overrides(&mut self, args: &Args) {
        if let Some(data_dir) = &args.data_dir {
            self.storage = StoreBackend::RocksDb {
                path: data_dir.join("grades"),
            };
        }

        if args.memory_store {
            self.storage = StoreBackend::Memory;
        }

        if args.enable_mining {
            self.mining.enabled = true;
        }

        if let Some(miner_id) = &args.miner_id {
            self.mining.miner_id = miner_id.clone();
        }

        if let Some(payout) = &args.payout_address {
            self.mining.payout_address = payout.clone();
        }

        if let Some(threads) = args.threads {
            self.mining.num_threads = threads;
        }

        if let Some(interval) = args.block_interval_ms {
            self.feed.block_interval_ms = interval;
            self.feed.watchdog_timeout_ms = interval.saturating_mul(WATCHDOG_INTERVALS);
            self.mining.submission_window_ms = submission_window_for(interval);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let feed = &self.feed;
        if feed.block_interval_ms == 0 {
            return Err(invalid("feed", "block_interval_ms must be non-zero"));
        }
        if feed.watchdog_timeout_ms <= feed.block_interval_ms {
            return Err(invalid(
                "feed",
                "watchdog_timeout_ms must exceed block_interval_ms",
            ));
        }

        if let StoreBackend::RocksDb { path } = &self.storage {
            if path.as_os_str().is_empty() {
                return Err(invalid("storage", "rocksdb backend needs a path"));
            }
        }

        for (asset, price) in &self.prices.quotes {
            if !(price.is_finite() && *price > 0.0) {
                return Err(invalid("prices", format!("quote for {} must be positive", asset)));
            }
        }
        if let Some(default) = self.prices.default {
            if !(default.is_finite() && default > 0.0) {
                return Err(invalid("prices", "default quote must be positive"));
            }
        }

        if self.status.interval_secs == 0 {
            return Err(invalid("status", "interval_secs must be non-zero"));
        }

        if self.mining.enabled {
            self.validate_mining()?;
        }
        Ok(())
    }

    fn validate_mining(&self) -> Result<(), ConfigError> {
        let mining = &self.mining;
        for (field, value) in [
            ("miner_id", &mining.miner_id),
            ("payout_address", &mining.payout_address),
        ] {
            if value.is_empty() || value.len() > MAX_IDENTITY_LEN {
                return Err(invalid(
                    "mining",
                    format!("{} must be 1..={} bytes", field, MAX_IDENTITY_LEN),
                ));
            }
        }
        if mining.num_threads == 0 || mining.num_threads > MAX_WORKERS {
            return Err(invalid(
                "mining",
                format!("num_threads must be in 1..={}", MAX_WORKERS),
            ));
        }
        if mining.grace_period_ms == 0
            || mining.submission_window_ms == 0
            || mining.price_timeout_ms == 0
        {
            return Err(invalid(
                "mining",
                "grace_period_ms, submission_window_ms and price_timeout_ms must be non-zero",
            ));
        }
        if mining.submission_window_ms > self.feed.block_interval_ms {
            return Err(invalid(
                "mining",
                "submission_window_ms must not exceed block_interval_ms",
            ));
        }

        // Every asset of every rule set on this network needs a quote.
        if self.prices.default.is_none() {
            let schedule = self.schedule();
            let missing = schedule
                .rule_sets()
                .iter()
                .flat_map(|rules| rules.assets.iter())
                .find(|asset| !self.prices.quotes.contains_key(**asset));
            if let Some(asset) = missing {
                return Err(invalid("prices", format!("no quote for {}", asset)));
            }
        }
        Ok(())
    }

    pub fn schedule(&self) -> ProtocolSchedule {
        ProtocolSchedule::for_network(self.network.network)
    }

    pub fn coordinator_config(&self) -> MiningCoordinatorConfig {
        let mining = &self.mining;
        MiningCoordinatorConfig {
            num_workers: mining.num_threads,
            miner_id: mining.miner_id.clone(),
            payout_address: mining.payout_address.clone(),
            grace_period: Duration::from_millis(mining.grace_period_ms),
            submission_window: Duration::from_millis(mining.submission_window_ms),
            settle_timeout: Duration::from_millis(mining.settle_timeout_ms),
            price_timeout: Duration::from_millis(mining.price_timeout_ms),
        }
    }

    pub fn price_source(&self) -> FixedPriceSource {
        let quotes = self
            .prices
            .quotes
            .iter()
            .map(|(asset, price)| (asset.clone(), to_fixed_point(*price)))
            .collect();
        FixedPriceSource::new(quotes, self.prices.default.map(to_fixed_point))
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.feed.block_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.feed.watchdog_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_network(Network::MainNet)
    }
}

fn to_fixed_point(price: f64) -> u64 {
    (price * PRICE_PRECISION as f64).round() as u64
}
