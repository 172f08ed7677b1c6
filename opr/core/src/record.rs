//! Oracle price records
//!
//! A record is the body a miner commits to (height, identity, previous
//! winners and a price quote per tracked asset) plus the nonce that was
//! searched for and the resulting proof-of-work digest.

use crate::pow::PowHasher;
use crypto_hashes::{Hash, HashWriter};
use serde::{Deserialize, Serialize};

/// Prices are fixed point with eight decimals.
pub const PRICE_PRECISION: u64 = 100_000_000;

/// The part of a record covered by the body hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OprBody {
    pub height: u64,
    pub version: u8,
    pub miner_id: String,
    pub payout_address: String,
    /// Short ids of the previous height's winners, in rank order
    pub prev_winners: Vec<String>,
    /// One quote per asset of the active rule set, in rule-set order
    pub prices: Vec<u64>,
}

impl OprBody {
    /// Canonical hash of the body. Miners search nonces against this value.
    pub fn opr_hash(&self) -> Hash {
        let mut writer = HashWriter::new();
        writer.write_u64(self.height);
        writer.write_var_bytes(&[self.version]);
        writer.write_var_bytes(self.miner_id.as_bytes());
        writer.write_var_bytes(self.payout_address.as_bytes());
        writer.write_u64(self.prev_winners.len() as u64);
        for winner in &self.prev_winners {
            writer.write_var_bytes(winner.as_bytes());
        }
        writer.write_u64(self.prices.len() as u64);
        for price in &self.prices {
            writer.write_u64(*price);
        }
        writer.finalize()
    }
}

/// A candidate submission for one height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePriceRecord {
    pub body: OprBody,
    pub nonce: u64,
    pub digest: Hash,
}

impl OraclePriceRecord {
    /// Seals a body with a nonce, computing the digest the hasher expects.
    pub fn seal(body: OprBody, nonce: u64, hasher: &dyn PowHasher) -> Self {
        let digest = hasher.digest(&body.opr_hash(), nonce);
        Self { body, nonce, digest }
    }

    /// Recomputes the digest and compares it with the one carried.
    pub fn has_valid_digest(&self, hasher: &dyn PowHasher) -> bool {
        hasher.digest(&self.body.opr_hash(), self.nonce) == self.digest
    }

    pub fn difficulty(&self, hasher: &dyn PowHasher) -> u64 {
        hasher.difficulty(&self.digest)
    }

    pub fn height(&self) -> u64 {
        self.body.height
    }

    pub fn miner_id(&self) -> &str {
        &self.body.miner_id
    }

    pub fn short_id(&self) -> String {
        self.digest.short_id()
    }
}
