//! oprpad - OPR mining and grading node daemon
//!
//! Wires the grading store, the record grader and the mining coordinator
//! to a height feed and keeps them running until shutdown.

pub mod chain;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod ui;

pub use cli::Args;
pub use config::{Config, ConfigError};
pub use daemon::Daemon;
pub use errors::DaemonError;
