use crate::config::ConfigError;
use database::DbError;
use grader::GradeError;
use mining::MiningError;
use opr_core::FeedError;
use thiserror::Error;

/// Top-level failure, tagged with the subsystem that raised it.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] DbError),

    #[error(transparent)]
    Grader(#[from] GradeError),

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("{task} task ended abnormally: {reason}")]
    Task { task: &'static str, reason: String },
}

impl DaemonError {
    pub fn subsystem(&self) -> &'static str {
        match self {
            DaemonError::Config(_) => "config",
            DaemonError::Storage(_) => "storage",
            DaemonError::Grader(_) => "grader",
            DaemonError::Mining(_) => "mining",
            DaemonError::Feed(_) => "height feed",
            DaemonError::Task { task, .. } => task,
        }
    }
}
