//! Helpers for building records with chosen difficulties in tests.

use crate::pow::PowHasher;
use crate::record::{OprBody, OraclePriceRecord, PRICE_PRECISION};
use crate::rules::RuleSet;
use crypto_hashes::{Hash, OprPowHash};

/// Hasher whose digest starts with the nonce, so a record's difficulty is
/// its nonce and tests can dictate ranking. The remaining bytes come from the
/// network digest and still differ between bodies.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonceDifficulty;

impl PowHasher for NonceDifficulty {
    fn digest(&self, opr_hash: &Hash, nonce: u64) -> Hash {
        let mut bytes = *OprPowHash::digest(opr_hash, nonce).as_bytes();
        bytes[..8].copy_from_slice(&nonce.to_be_bytes());
        Hash::from_bytes(bytes)
    }
}

/// Prices of `base` whole units for every asset in `rules`.
pub fn flat_prices(rules: &RuleSet, base: u64) -> Vec<u64> {
    vec![base * PRICE_PRECISION; rules.asset_count()]
}

/// Seals a well-formed record for `height` under `rules`.
pub fn record(
    rules: &RuleSet,
    height: u64,
    miner_id: &str,
    prices: Vec<u64>,
    difficulty: u64,
) -> OraclePriceRecord {
    record_with_prev(rules, height, miner_id, prices, difficulty, Vec::new())
}

pub fn record_with_prev(
    rules: &RuleSet,
    height: u64,
    miner_id: &str,
    prices: Vec<u64>,
    difficulty: u64,
    prev_winners: Vec<String>,
) -> OraclePriceRecord {
    let body = OprBody {
        height,
        version: rules.version,
        miner_id: miner_id.to_string(),
        payout_address: format!("{}-payout", miner_id),
        prev_winners,
        prices,
    };
    OraclePriceRecord::seal(body, difficulty, &NonceDifficulty)
}
