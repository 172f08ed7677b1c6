//! Digest and difficulty derivation
//!
//! Miners and graders must agree bit-for-bit on both functions, so they sit
//! behind one trait that is handed to every component at construction.

use crypto_hashes::{Hash, OprPowHash};

/// Digest function bound to one record body hash.
pub trait NonceDigest {
    fn digest(&self, nonce: u64) -> Hash;
}

impl NonceDigest for OprPowHash {
    fn digest(&self, nonce: u64) -> Hash {
        self.finalize_with_nonce(nonce)
    }
}

pub trait PowHasher: Send + Sync {
    /// Digest of a record body hash combined with a nonce.
    fn digest(&self, opr_hash: &Hash, nonce: u64) -> Hash {
        OprPowHash::digest(opr_hash, nonce)
    }

    /// Difficulty of a digest. Higher is harder.
    fn difficulty(&self, digest: &Hash) -> u64 {
        digest.leading_u64()
    }

    /// Search state for many nonces over one body hash. Must agree with
    /// [`PowHasher::digest`] for every nonce.
    fn prepare(&self, opr_hash: &Hash) -> Box<dyn NonceDigest + '_> {
        Box::new(Unprepared {
            hasher: self,
            opr_hash: *opr_hash,
        })
    }
}

struct Unprepared<'a, H: ?Sized> {
    hasher: &'a H,
    opr_hash: Hash,
}

impl<H: PowHasher + ?Sized> NonceDigest for Unprepared<'_, H> {
    fn digest(&self, nonce: u64) -> Hash {
        self.hasher.digest(&self.opr_hash, nonce)
    }
}

/// Network proof-of-work: blake3 over the body hash and nonce, difficulty
/// from the leading eight digest bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Pow;

impl PowHasher for Blake3Pow {
    fn prepare(&self, opr_hash: &Hash) -> Box<dyn NonceDigest + '_> {
        Box::new(OprPowHash::new(opr_hash))
    }
}
