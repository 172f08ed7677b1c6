use crate::Hash;

/// Proof-of-work hasher for oracle price records.
///
/// The record body hash is absorbed once; each nonce trial clones the
/// prepared state and appends the nonce, so a worker pays only for the
/// final compression per attempt.
#[derive(Clone)]
pub struct OprPowHash {
    inner: blake3::Hasher,
}

impl OprPowHash {
    pub fn new(opr_hash: &Hash) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(opr_hash.as_bytes());
        Self { inner }
    }

    pub fn finalize_with_nonce(&self, nonce: u64) -> Hash {
        let mut state = self.inner.clone();
        state.update(&nonce.to_le_bytes());
        Hash::from_bytes(*state.finalize().as_bytes())
    }

    /// One-shot form of [`OprPowHash::finalize_with_nonce`].
    pub fn digest(opr_hash: &Hash, nonce: u64) -> Hash {
        Self::new(opr_hash).finalize_with_nonce(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_opr_pow_hash() {
        let opr_hash = Hash::from_bytes(hex!(
            "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
        ));

        let hasher = OprPowHash::new(&opr_hash);
        let hash = hasher.finalize_with_nonce(42);

        // Hash should be deterministic
        assert_eq!(hash, OprPowHash::digest(&opr_hash, 42));

        // Different nonce should give different hash
        assert_ne!(hash, hasher.finalize_with_nonce(43));
    }
}
