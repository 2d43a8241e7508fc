//! # Outbound Ports
//!
//! What this crate requires from the host: a key-value database.
//! It also defines the read-only coin source an overlay sits on.
//!
//! Production: `RocksDbStore` (`adapters::rocksdb`, feature `rocksdb`)
//! Testing: `InMemoryKVStore` (`adapters::memory`)

use crate::error::StoreResult;
use chain_types::{Coin, OutPoint};
use primitive_types::H256;

/// Abstract interface for key-value database operations.
///
/// All methods take `&self`; implementations serialize writers internally so
/// a store can be shared behind an `Arc` by the commit service and index stores.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Delete a key.
    fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch are applied, or NONE are.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> StoreResult<()>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> StoreResult<bool>;

    /// Keys starting with `prefix`, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Read-only view of committed coins.
pub trait CoinSource: Send + Sync {
    /// Unspent coin at `outpoint`.
    fn coin(&self, outpoint: &OutPoint) -> StoreResult<Option<Coin>>;

    /// Whether `outpoint` is unspent.
    fn has_coin(&self, outpoint: &OutPoint) -> StoreResult<bool> {
        Ok(self.coin(outpoint)?.is_some())
    }

    /// Block the committed set corresponds to.
    fn best_block(&self) -> StoreResult<H256>;
}
