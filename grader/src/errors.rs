use database::DbError;
use opr_core::FeedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GradeError {
    #[error("Invalid grading input: {0}")]
    InvalidInput(String),

    #[error("No grading result for height {0}")]
    NotFound(u64),

    #[error("Grading store failure: {0}")]
    Store(#[from] DbError),

    #[error("Height feed failed: {0}")]
    FeedFatal(#[from] FeedError),
}

pub type GraderResult<T> = Result<T, GradeError>;
