//! Core types shared by the grader, the mining coordinator and the node daemon.
//!
//! ## Module Organization
//!
//! - [`record`]: oracle price records and their canonical body hash
//! - [`pow`]: digest and difficulty derivation
//! - [`rules`]: protocol rule sets, activated by height
//! - [`result`]: the persisted grading result
//! - [`pool`]: the record-collection path between miners and the grader
//! - [`monitor`]: height notifications and the fatal feed signal

pub mod errors;
pub mod monitor;
pub mod pool;
pub mod pow;
pub mod record;
pub mod result;
pub mod rules;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use crypto_hashes::Hash;
pub use errors::FeedError;
pub use monitor::{FatalSignal, HeightSubscription, Monitor};
pub use pool::{RecordPool, RecordSink, RecordSource};
pub use pow::{Blake3Pow, NonceDigest, PowHasher};
pub use record::{OprBody, OraclePriceRecord, PRICE_PRECISION};
pub use result::{GradingResult, Winner};
pub use rules::{DeviationRule, Network, ProtocolSchedule, RewardSchedule, RewardTier, RuleSet};
