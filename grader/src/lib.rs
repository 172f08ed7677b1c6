//! Record grader
//!
//! Turns the candidate records observed for a height into the canonical,
//! persisted winner list. Every step is deterministic so that independent
//! nodes derive byte-identical results from the same candidates.
//!
//! ## Module Organization
//!
//! - [`filter`]: per-record admission checks and rejection reasons
//! - [`ranking`]: ordering, per-miner de-duplication and the two cuts
//! - [`grader`]: the [`Grader`] entry points and its control loop
//! - [`stats`]: grading counters

pub mod errors;
pub mod filter;
pub mod grader;
pub mod ranking;
pub mod stats;

pub use errors::{GradeError, GraderResult};
pub use filter::RejectReason;
pub use grader::Grader;
pub use stats::{GradingSnapshot, GradingStats};
