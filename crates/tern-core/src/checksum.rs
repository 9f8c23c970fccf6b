//! SHA-256 checksums for state comparison.

use sha2::{Digest, Sha256};

/// Compute the hex SHA-256 checksum of a string body.
pub fn compute_checksum(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(compute_checksum("select 1"), compute_checksum("select 1"));
        assert_ne!(compute_checksum("select 1"), compute_checksum("select 2"));
    }
}
