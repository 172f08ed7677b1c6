//! Mining coordination for oracle price records
//!
//! This module runs the proof-of-work search for the node's own records. A
//! coordinator follows the height feed and, for every height, tears down
//! the previous worker cohort and starts a new one against a fresh template.
//! Records that improve on a worker's best difficulty go to the record sink.
//!
//! ## Module Organization
//!
//! - [`template`]: per-height mining templates
//! - [`worker`]: nonce partitioning and the search loop
//! - [`cohort`]: worker cohorts and their cancellation scope
//! - [`coordinator`]: the per-height control loop and its state machine
//! - [`price`]: price snapshot sources
//! - [`stats`]: mining counters and hash rate

pub mod cohort;
pub mod coordinator;
pub mod errors;
pub mod price;
pub mod stats;
pub mod template;
pub mod worker;

#[cfg(test)]
mod tests;

pub use cohort::{CohortOutcome, CohortScope, WorkerCohort};
pub use coordinator::{CohortState, MiningCoordinator, MiningCoordinatorConfig, MAX_WORKERS};
pub use errors::{MiningError, MiningResult, TemplateError};
pub use price::{FixedPriceSource, PriceError, PriceSource};
pub use stats::{MiningSnapshot, MiningStats};
pub use template::MiningTemplate;
pub use worker::{SearchWorker, StopReason, WorkerDescriptor, WorkerReport, NONCE_BATCH};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coordinator::{CohortState, MiningCoordinator, MiningCoordinatorConfig};
    pub use crate::price::{FixedPriceSource, PriceSource};
    pub use crate::stats::{MiningSnapshot, MiningStats};
    pub use crate::template::MiningTemplate;
    pub use crate::worker::WorkerDescriptor;
}
