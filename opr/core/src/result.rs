use crate::record::OraclePriceRecord;
use crate::rules::RewardTier;
use serde::{Deserialize, Serialize};

/// A graded winner with its 1-based rank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub rank: u32,
    pub tier: RewardTier,
    pub reward: u64,
    pub difficulty: u64,
    pub record: OraclePriceRecord,
}

/// The ranked winners for one height. Never rewritten once persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingResult {
    pub height: u64,
    pub version: u8,
    pub winners: Vec<Winner>,
}

impl GradingResult {
    /// A result recording that nothing qualified at this height.
    pub fn no_winners(height: u64, version: u8) -> Self {
        Self {
            height,
            version,
            winners: Vec::new(),
        }
    }

    pub fn has_winners(&self) -> bool {
        !self.winners.is_empty()
    }

    /// Short ids of the winners in rank order. Records for the next height
    /// must reference exactly this list.
    pub fn short_ids(&self) -> Vec<String> {
        self.winners.iter().map(|w| w.record.short_id()).collect()
    }

    pub fn winner_for(&self, miner_id: &str) -> Option<&Winner> {
        self.winners.iter().find(|w| w.record.miner_id() == miner_id)
    }
}
