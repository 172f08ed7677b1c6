//! Canonical SHA-256 encoding for record bodies.

use sha2::{Digest, Sha256};
use std::io::Write;

use crate::Hash;

/// Compute SHA256(data)
pub fn sha256(data: &[u8]) -> Hash {
    Hash::from_bytes(Sha256::digest(data).into())
}

/// Streaming SHA-256 over a field-by-field encoding.
///
/// Integers are little-endian; byte strings carry a u64 length prefix, so
/// two different field sequences never hash the same input.
#[derive(Clone)]
pub struct HashWriter(Sha256);

impl HashWriter {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn finalize(self) -> Hash {
        Hash::from_bytes(self.0.finalize().into())
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.0.update((bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.0.update(value.to_le_bytes());
    }
}

impl Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Default for HashWriter {
    fn default() -> Self {
        Self::new()
    }
}
