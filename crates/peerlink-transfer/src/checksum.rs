//! Payload checksums.
//!
//! SHA-256 rendered as lowercase hex. Comparison ignores hex case so a
//! peer that emits uppercase digests still verifies.

use sha2::{Digest, Sha256};

/// Hex digest of `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare two hex digests, ignoring case.
#[must_use]
pub fn checksum_matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}
