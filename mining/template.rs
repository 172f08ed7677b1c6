//! Mining templates
//!
//! A [`MiningTemplate`] carries everything a search worker needs for one
//! height: the record body it commits to, the body hash precomputed once,
//! the difficulty floor and the instant after which submissions are useless.

use crypto_hashes::Hash;
use opr_core::{OprBody, OraclePriceRecord};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct MiningTemplate {
    /// Issued by the coordinator, unique within its lifetime
    pub template_id: u64,
    pub body: OprBody,
    /// Hash of `body`, the prefix of every nonce attempt
    pub opr_hash: Hash,
    /// Candidates below this difficulty are never emitted
    pub min_difficulty: u64,
    pub cutoff: Instant,
}

impl MiningTemplate {
    /// Builds a template whose submission window closes `window` from now.
    pub fn new(template_id: u64, body: OprBody, min_difficulty: u64, window: Duration) -> Self {
        Self::with_cutoff(template_id, body, min_difficulty, Instant::now() + window)
    }

    pub fn with_cutoff(
        template_id: u64,
        body: OprBody,
        min_difficulty: u64,
        cutoff: Instant,
    ) -> Self {
        let opr_hash = body.opr_hash();
        Self {
            template_id,
            body,
            opr_hash,
            min_difficulty,
            cutoff,
        }
    }

    pub fn height(&self) -> u64 {
        self.body.height
    }

    pub fn version(&self) -> u8 {
        self.body.version
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.cutoff
    }

    pub fn time_remaining(&self) -> Duration {
        self.cutoff.saturating_duration_since(Instant::now())
    }

    /// Builds the record for a nonce whose digest was already computed.
    pub fn record_for(&self, nonce: u64, digest: Hash) -> OraclePriceRecord {
        OraclePriceRecord {
            body: self.body.clone(),
            nonce,
            digest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opr_core::testing::flat_prices;
    use opr_core::{Blake3Pow, PowHasher, RuleSet};

    fn body() -> OprBody {
        let rules = RuleSet::v1(0);
        OprBody {
            height: 12,
            version: rules.version,
            miner_id: "miner".to_string(),
            payout_address: "payout".to_string(),
            prev_winners: Vec::new(),
            prices: flat_prices(&rules, 1),
        }
    }

    #[test]
    fn body_hash_is_computed_once_per_body() {
        let a = MiningTemplate::new(1, body(), 0, Duration::from_secs(1));
        let b = MiningTemplate::new(2, body(), 0, Duration::from_secs(1));
        assert_eq!(a.opr_hash, b.opr_hash);
        assert_eq!(a.opr_hash, body().opr_hash());
    }

    #[test]
    fn records_verify_against_the_body() {
        let template = MiningTemplate::new(1, body(), 0, Duration::from_secs(1));
        let digest = Blake3Pow.digest(&template.opr_hash, 77);
        let record = template.record_for(77, digest);
        assert!(record.has_valid_digest(&Blake3Pow));
        assert_eq!(record.height(), 12);
    }

    #[test]
    fn expiry_follows_cutoff() {
        let past = MiningTemplate::with_cutoff(1, body(), 0, Instant::now());
        assert!(past.is_expired());
        assert_eq!(past.time_remaining(), Duration::ZERO);

        let future = MiningTemplate::new(2, body(), 0, Duration::from_secs(60));
        assert!(!future.is_expired());
    }
}
