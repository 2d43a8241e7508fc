//! Hashing utilities shared across the workspace.
//!
//! Every consensus hash (transaction ids, block hashes, merkle nodes) is a
//! double SHA-256 over the canonical encoding in [`crate::encoding`].

use primitive_types::{H256, U256};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of data
#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute double SHA-256 hash (Bitcoin-style)
#[inline]
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first_hash = sha256(data);
    sha256(&first_hash)
}

/// Double SHA-256 as an [`H256`].
#[inline]
pub fn hash256(data: &[u8]) -> H256 {
    H256::from(sha256d(data))
}

/// Interpret a hash as a little-endian 256-bit integer.
///
/// This is the ordering used when a block hash is compared against a target.
#[inline]
pub fn hash_to_u256(hash: &H256) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

/// Inverse of [`hash_to_u256`].
#[inline]
pub fn u256_to_hash(value: U256) -> H256 {
    let mut bytes = [0u8; 32];
    value.to_little_endian(&mut bytes);
    H256::from(bytes)
}

/// Merkle root over a list of leaf hashes.
///
/// Odd levels duplicate their last node. An empty list yields the zero hash.
pub fn merkle_root(leaves: &[H256]) -> H256 {
    if leaves.is_empty() {
        return H256::zero();
    }

    let mut level: Vec<H256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(pair[0].as_bytes());
                buf[32..].copy_from_slice(pair[1].as_bytes());
                hash256(&buf)
            })
            .collect();
    }
    level[0]
}

/// Abbreviated hex rendering for log lines.
pub fn short_hex(hash: &H256) -> String {
    hex::encode(&hash.as_bytes()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256d_empty() {
        assert_eq!(
            hex::encode(sha256d(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_merkle_single_leaf_is_leaf() {
        let leaf = hash256(b"tx");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn test_merkle_odd_level_duplicates_last() {
        let a = hash256(b"a");
        let b = hash256(b"b");
        let c = hash256(b"c");
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[a, b, c, c]));
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn test_u256_hash_conversion_is_little_endian() {
        let value = U256::from(0x0102u64);
        let hash = u256_to_hash(value);
        assert_eq!(hash.as_bytes()[0], 0x02);
        assert_eq!(hash.as_bytes()[1], 0x01);
        assert_eq!(hash_to_u256(&hash), value);
    }
}
