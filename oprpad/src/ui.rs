//! Console output for the daemon

use crate::config::{Config, StatusFormat};
use database::StoreBackend;
use grader::GradingSnapshot;
use mining::MiningSnapshot;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// ANSI color codes for terminal output
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_CYAN: &str = "\x1b[96m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Print startup banner
pub fn print_banner(version: &str, network: &str) {
    println!();
    println!("{}{}{}", colors::BRIGHT_CYAN, RULE, colors::RESET);
    println!(
        "{}  OPRPAD v{}{}  oracle price record node",
        colors::BOLD,
        version,
        colors::RESET
    );
    println!(
        "  Network: {}{}{}",
        colors::BRIGHT_GREEN,
        network,
        colors::RESET
    );
    println!("{}{}{}", colors::BRIGHT_CYAN, RULE, colors::RESET);
    println!();
}

/// Status types for colored output
#[derive(Debug, Clone, Copy)]
pub enum StatusType {
    Success,
    Info,
    Warning,
    Error,
}

/// Print status line with icon and color
pub fn print_status(icon: &str, message: &str, status: StatusType) {
    let color = match status {
        StatusType::Success => colors::BRIGHT_GREEN,
        StatusType::Info => colors::BRIGHT_CYAN,
        StatusType::Warning => colors::BRIGHT_YELLOW,
        StatusType::Error => colors::BRIGHT_RED,
    };
    println!("{}[{}]{} {}", color, icon, colors::RESET, message);
}

/// Print a section header
pub fn print_section(title: &str) {
    println!();
    println!("{}{}{}", colors::DIM, RULE, colors::RESET);
    println!("{}  {}{}{}", colors::BRIGHT_CYAN, colors::BOLD, title, colors::RESET);
    println!("{}{}{}", colors::DIM, RULE, colors::RESET);
    println!();
}

/// Print key-value pair in a formatted way
pub fn print_kv(key: &str, value: &str) {
    println!(
        "  {}{}:{} {}{}{}",
        colors::BRIGHT_WHITE,
        key,
        colors::RESET,
        colors::BRIGHT_CYAN,
        value,
        colors::RESET
    );
}

pub fn print_config_summary(config: &Config) {
    print_section("Configuration");

    print_kv("Network", &config.network.network.to_string());
    let storage = match &config.storage {
        StoreBackend::Memory => "in-memory".to_string(),
        StoreBackend::RocksDb { path } => format!("rocksdb at {}", path.display()),
    };
    print_kv("Grading Store", &storage);
    print_kv(
        "Block Interval",
        &format_duration(config.block_interval()),
    );
    print_kv("Mining", if config.mining.enabled { "Enabled" } else { "Disabled" });

    if config.mining.enabled {
        print_kv("Miner ID", &config.mining.miner_id);
        print_kv("Payout Address", &config.mining.payout_address);
        print_kv("Mining Threads", &config.mining.num_threads.to_string());
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ComponentStatus {
    Starting,
    Running,
    Stopped,
}

pub fn print_component_status(component: &str, status: ComponentStatus) {
    let (icon, color, text) = match status {
        ComponentStatus::Starting => ("⏳", colors::BRIGHT_YELLOW, "Starting"),
        ComponentStatus::Running => ("✓", colors::BRIGHT_GREEN, "Running"),
        ComponentStatus::Stopped => ("✗", colors::BRIGHT_RED, "Stopped"),
    };
    println!("  {}[{}]{} {:<20} {}", color, icon, colors::RESET, component, text);
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format hashrate as human-readable string
pub fn format_hashrate(hashrate: f64) -> String {
    if hashrate >= 1e9 {
        format!("{:.2} GH/s", hashrate / 1e9)
    } else if hashrate >= 1e6 {
        format!("{:.2} MH/s", hashrate / 1e6)
    } else if hashrate >= 1e3 {
        format!("{:.2} KH/s", hashrate / 1e3)
    } else {
        format!("{:.2} H/s", hashrate)
    }
}

/// Node status summary
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    #[serde(serialize_with = "serialize_secs")]
    pub uptime: Duration,
    pub height: Option<u64>,
    pub grading: GradingSnapshot,
    pub mining: Option<MiningSnapshot>,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

impl NodeStatus {
    pub fn render(&self, format: StatusFormat) -> String {
        match format {
            StatusFormat::Text => self.to_string(),
            StatusFormat::Json => serde_json::to_string(self)
                .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e)),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = |f: &mut fmt::Formatter<'_>, key: &str| {
            write!(f, "  {}{:<18}{}", colors::BRIGHT_WHITE, key, colors::RESET)
        };
        writeln!(f, "{}{}{}", colors::DIM, RULE, colors::RESET)?;
        writeln!(f, "{}  Node Status Summary{}", colors::BRIGHT_CYAN, colors::RESET)?;
        writeln!(f, "{}{}{}", colors::DIM, RULE, colors::RESET)?;

        label(f, "Uptime:")?;
        writeln!(f, "{}", format_duration(self.uptime))?;
        label(f, "Height:")?;
        match self.height {
            Some(height) => writeln!(f, "{}", height)?,
            None => writeln!(f, "waiting")?,
        }
        label(f, "Last graded:")?;
        match self.grading.last_graded {
            Some(height) => writeln!(f, "{}", height)?,
            None => writeln!(f, "none")?,
        }
        label(f, "Graded/skipped:")?;
        writeln!(
            f,
            "{} / {}",
            self.grading.heights_graded, self.grading.heights_skipped
        )?;
        label(f, "Records seen:")?;
        writeln!(f, "{} ({} winners)", self.grading.records_seen, self.grading.winners)?;

        label(f, "Mining:")?;
        match &self.mining {
            Some(mining) => writeln!(
                f,
                "{}{}{} ({} submissions)",
                colors::BRIGHT_GREEN,
                format_hashrate(mining.hash_rate),
                colors::RESET,
                mining.submissions
            )?,
            None => writeln!(f, "{}Disabled{}", colors::DIM, colors::RESET)?,
        }
        writeln!(f)
    }
}
