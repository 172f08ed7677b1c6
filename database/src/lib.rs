//! Grading state store
//!
//! Maps a block height to its persisted [`opr_core::GradingResult`]. Two
//! backends implement [`GradeStore`]: an in-memory map and a RocksDB store
//! that survives restarts. The backend is picked once, via [`open_store`].

pub mod backend;
pub mod cache;
pub mod db;
pub mod errors;
pub mod grade_store;

pub use backend::{open_store, StoreBackend};
pub use db::Database;
pub use errors::{DbError, DbResult};
pub use grade_store::{GradeStore, MemoryGradeStore, PutOutcome, RocksGradeStore};
