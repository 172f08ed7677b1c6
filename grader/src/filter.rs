//! Per-record admission checks
//!
//! A record that fails any check is dropped from the grading pass and
//! counted; it never aborts grading of the height.

use opr_core::{OraclePriceRecord, PowHasher, RuleSet};
use serde::Serialize;
use std::fmt;

/// Longest accepted miner id or payout address, in bytes.
pub const MAX_IDENTITY_LEN: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RejectReason {
    /// Version tag does not match the rule set at the height
    Version,
    /// Wrong height, price vector shape, zero price or bad identity fields
    Malformed,
    /// Previous-winner list does not match the stored result
    PrevWinners,
    /// Digest does not match the record contents
    BadDigest,
    /// Difficulty below the height's floor
    Difficulty,
    /// Another record from the same miner ranks higher
    Superseded,
}

impl RejectReason {
    pub const ALL: [RejectReason; 6] = [
        RejectReason::Version,
        RejectReason::Malformed,
        RejectReason::PrevWinners,
        RejectReason::BadDigest,
        RejectReason::Difficulty,
        RejectReason::Superseded,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the rejection comes from the format filter.
    pub fn is_format(self) -> bool {
        matches!(
            self,
            RejectReason::Version
                | RejectReason::Malformed
                | RejectReason::PrevWinners
                | RejectReason::BadDigest
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::Version => "version",
            RejectReason::Malformed => "malformed",
            RejectReason::PrevWinners => "prev_winners",
            RejectReason::BadDigest => "bad_digest",
            RejectReason::Difficulty => "difficulty",
            RejectReason::Superseded => "superseded",
        };
        f.write_str(name)
    }
}

fn valid_identity(value: &str) -> bool {
    !value.is_empty() && value.len() <= MAX_IDENTITY_LEN
}

/// Format filter for one record graded at `height`.
///
/// The digest is checked last since it is the only expensive check.
pub fn check_format(
    record: &OraclePriceRecord,
    height: u64,
    rules: &RuleSet,
    expected_prev_winners: &[String],
    hasher: &dyn PowHasher,
) -> Result<(), RejectReason> {
    let body = &record.body;
    if body.version != rules.version {
        return Err(RejectReason::Version);
    }
    if body.height != height
        || body.prices.len() != rules.asset_count()
        || body.prices.iter().any(|&p| p == 0)
        || !valid_identity(&body.miner_id)
        || !valid_identity(&body.payout_address)
    {
        return Err(RejectReason::Malformed);
    }
    if body.prev_winners.as_slice() != expected_prev_winners {
        return Err(RejectReason::PrevWinners);
    }
    if !record.has_valid_digest(hasher) {
        return Err(RejectReason::BadDigest);
    }
    Ok(())
}
