//! Deterministic tenant placement.
//!
//! Plain modulo hashing, not a ring: changing `N` reshuffles most tenants.
//! That is acceptable because the hash only decides the initial placement.

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest of a tenant id.
pub fn tenant_hash(tenant_id: &str) -> String {
    hex::encode(Sha256::digest(tenant_id.as_bytes()))
}

/// Shard number in `1..=num_shards` for a tenant.
///
/// The first 8 hex characters of the digest are its first 4 bytes read
/// big-endian. A `num_shards` of zero is treated as one.
pub fn shard_number(tenant_id: &str, num_shards: u32) -> u32 {
    let digest = Sha256::digest(tenant_id.as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    value % num_shards.max(1) + 1
}

/// Format a shard id: `<prefix>-<number zero-padded to 3 digits>`.
pub fn format_shard_id(prefix: &str, number: u32) -> String {
    format!("{prefix}-{number:03}")
}

/// Hash placement of a tenant under `num_shards`.
pub fn shard_for_tenant(tenant_id: &str, num_shards: u32, prefix: &str) -> String {
    format_shard_id(prefix, shard_number(tenant_id, num_shards))
}

/// Parse the numeric suffix of a shard id (`aipress-shard-042` → 42).
pub fn parse_shard_number(shard_id: &str) -> Option<u32> {
    shard_id.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acme_resolves_to_fixed_shard() {
        // sha256("acme") starts with 822b33ad = 2183869357; % 1000 + 1 = 358.
        assert_eq!(
            shard_for_tenant("acme", 1000, "aipress-shard"),
            "aipress-shard-358"
        );
        assert_eq!(
            shard_for_tenant("acme", 1000, "aipress-shard"),
            shard_for_tenant("acme", 1000, "aipress-shard")
        );
    }

    #[test]
    fn hash_matches_hex_prefix() {
        let hash = tenant_hash("acme");
        assert_eq!(hash.len(), 64);
        assert!(hash.starts_with("822b33ad"));

        let value = u32::from_str_radix(&hash[..8], 16).unwrap();
        assert_eq!(value % 5 + 1, shard_number("acme", 5));
    }

    #[test]
    fn shard_number_stays_in_range() {
        for n in [1u32, 2, 3, 7, 50, 1000] {
            for i in 0..500 {
                let number = shard_number(&format!("tenant-{i}"), n);
                assert!((1..=n).contains(&number), "n={n} got {number}");
            }
        }
    }

    #[test]
    fn single_shard_always_one() {
        assert_eq!(shard_number("anything", 1), 1);
        assert_eq!(shard_number("anything", 0), 1);
    }

    #[test]
    fn padding_and_parsing() {
        assert_eq!(format_shard_id("aipress-shard", 7), "aipress-shard-007");
        assert_eq!(format_shard_id("s", 1234), "s-1234");
        assert_eq!(parse_shard_number("aipress-shard-042"), Some(42));
        assert_eq!(parse_shard_number("no-number-here"), None);
    }
}
