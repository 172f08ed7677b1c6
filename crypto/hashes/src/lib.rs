pub mod hasher;
pub mod pow_hash;

// Re-export commonly used types
pub use hasher::{sha256, HashWriter};
pub use pow_hash::OprPowHash;

use std::fmt;
use std::hash::Hash as StdHash;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

pub const HASH_SIZE: usize = 32;

/// Number of leading digest bytes that make up a record's short id.
pub const SHORT_ID_SIZE: usize = 8;

/// A 32-byte hash wrapper used across the project.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a hash from a 32-byte array
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Creates a zeroed hash
    pub const fn zeroed() -> Self {
        Self([0u8; HASH_SIZE])
    }

    /// Tries to create a Hash from a slice of bytes
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, std::array::TryFromSliceError> {
        let array: [u8; HASH_SIZE] = slice.try_into()?;
        Ok(Self(array))
    }

    /// Interprets the leading 8 bytes as a big-endian integer.
    pub fn leading_u64(&self) -> u64 {
        let mut be = [0u8; 8];
        be.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(be)
    }

    /// Hex of the leading bytes, used to reference a record compactly.
    pub fn short_id(&self) -> String {
        hex::encode(&self.0[..SHORT_ID_SIZE])
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }
}

impl From<Hash> for [u8; HASH_SIZE] {
    fn from(h: Hash) -> Self {
        h.0
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_slice(slice)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl StdHash for Hash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // use the last u64 as a fast hasher source
        let mut le = [0u8; 8];
        le.copy_from_slice(&self.0[24..32]);
        u64::from_le_bytes(le).hash(state);
    }
}

impl Deref for Hash {
    type Target = [u8; HASH_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::Hash;

    #[test]
    fn leading_u64_is_big_endian() {
        let mut bytes = [0u8; 32];
        bytes[7] = 0x2a;
        bytes[0] = 0x01;
        let h = Hash::from_bytes(bytes);
        assert_eq!(h.leading_u64(), 0x0100_0000_0000_002a);
    }

    #[test]
    fn short_id_takes_eight_bytes() {
        let h = Hash::from_bytes([0xab; 32]);
        assert_eq!(h.short_id(), "abababababababab");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut low = [0u8; 32];
        let mut high = [0u8; 32];
        low[31] = 0xff;
        high[0] = 0x01;
        assert!(Hash::from_bytes(low) < Hash::from_bytes(high));
    }
}
