use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "oprpad")]
#[command(about = "OPR mining and grading node daemon", long_about = None)]
pub struct Args {
    /// Path to configuration file (network defaults are used if not provided)
    #[arg(short, long)]
    pub config_path: Option<PathBuf>,

    /// Data directory for the grading store
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Network (mainnet, testnet, devnet)
    #[arg(short, long)]
    pub network: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Keep grading results in memory only
    #[arg(long, conflicts_with = "data_dir")]
    pub memory_store: bool,

    /// Enable mining
    #[arg(long)]
    pub enable_mining: bool,

    /// Miner identity written into every record
    #[arg(long)]
    pub miner_id: Option<String>,

    /// Address rewards are paid to
    #[arg(long)]
    pub payout_address: Option<String>,

    /// Number of search threads per height
    #[arg(long)]
    pub threads: Option<usize>,

    /// Interval between simulated heights, in milliseconds
    #[arg(long)]
    pub block_interval_ms: Option<u64>,
}

pub fn parse_args() -> Args {
    Args::parse()
}
