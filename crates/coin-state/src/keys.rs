//! Database key layout.
//!
//! Every record lives under a one-byte prefix so each family can be streamed
//! with a single prefix scan. Integers inside keys are big-endian so that
//! lexicographic key order matches numeric order.

use chain_types::OutPoint;
use primitive_types::H256;

/// Unspent coin: `C | txid | index`.
pub const COIN: u8 = b'C';
/// Best block of the coin set.
pub const BEST_BLOCK: u8 = b'B';
/// Block index record: `b | hash`.
pub const BLOCK_INDEX: u8 = b'b';
/// Named boolean flag: `F | name`.
pub const FLAG: u8 = b'F';
/// Reindex-in-progress marker.
pub const REINDEX: u8 = b'R';
/// Last block file number.
pub const LAST_BLOCK_FILE: u8 = b'l';
/// Accumulator snapshot: `A | checkpoint`.
pub const ACCUMULATOR: u8 = b'A';
/// Address index: `a | address | height | txid | index | spending`.
pub const ADDRESS: u8 = b'a';
/// Address unspent index: `u | address | txid | index`.
pub const ADDRESS_UNSPENT: u8 = b'u';
/// Timestamp index: `s | timestamp | block hash`.
pub const TIMESTAMP: u8 = b's';
/// Spent index: `p | txid | index`.
pub const SPENT: u8 = b'p';
/// Transaction position index: `t | txid`.
pub const TX_INDEX: u8 = b't';

/// Key for a single-byte record.
pub fn singleton(prefix: u8) -> Vec<u8> {
    vec![prefix]
}

/// Key for the coin at `outpoint`.
pub fn coin_key(outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(37);
    key.push(COIN);
    key.extend_from_slice(outpoint.txid.as_bytes());
    key.extend_from_slice(&outpoint.index.to_be_bytes());
    key
}

/// Outpoint encoded in a coin key.
pub fn outpoint_from_coin_key(key: &[u8]) -> Option<OutPoint> {
    if key.len() != 37 || key[0] != COIN {
        return None;
    }
    let txid = H256::from_slice(&key[1..33]);
    let mut index = [0u8; 4];
    index.copy_from_slice(&key[33..37]);
    Some(OutPoint::new(txid, u32::from_be_bytes(index)))
}

/// Key prefixed by `prefix` followed by a 32-byte hash.
pub fn hash_key(prefix: u8, hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(prefix);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Hash that follows the prefix byte, if the key is long enough.
pub fn hash_from_key(key: &[u8]) -> Option<H256> {
    key.get(1..33).map(H256::from_slice)
}

/// Key for a named flag.
pub fn flag_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(FLAG);
    key.extend_from_slice(name.as_bytes());
    key
}
