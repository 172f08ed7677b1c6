use crate::price::PriceError;
use grader::GradeError;
use opr_core::FeedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiningError {
    #[error("Invalid mining configuration: {0}")]
    Configuration(String),

    #[error("Failed to spawn search worker {worker_id}: {source}")]
    WorkerSpawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Height feed failed: {0}")]
    FeedFatal(#[from] FeedError),
}

/// Why no template could be built for a height. The height is skipped.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error(transparent)]
    Prices(#[from] PriceError),

    #[error("Price source did not answer within {0:?}")]
    PriceTimeout(std::time::Duration),

    #[error("Price source returned {got} quotes, rule set tracks {expected}")]
    QuoteCount { expected: usize, got: usize },

    #[error("Could not read previous winners: {0}")]
    PreviousWinners(#[from] GradeError),
}

pub type MiningResult<T> = Result<T, MiningError>;
