//! Durable coin set and the atomic overlay commit.

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::ports::{BatchOperation, CoinSource, KeyValueStore};
use crate::view::{CoinChanges, CoinViewCache};
use chain_types::{Amount, Coin, OutPoint};
use primitive_types::H256;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Counts of a committed batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchWriteSummary {
    /// Coins written.
    pub puts: usize,
    /// Coins erased.
    pub deletes: usize,
}

/// Aggregate statistics over the committed coin set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinStats {
    /// Block the set corresponds to.
    pub best_block: H256,
    /// Number of unspent outputs.
    pub outputs: u64,
    /// Sum of their values.
    pub total_amount: Amount,
    /// SHA-256 over the best block and every stored record in key order.
    pub serialized_hash: H256,
}

/// Coin set persisted in a [`KeyValueStore`].
pub struct CoinStore<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> CoinStore<S> {
    /// Coin set over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Commit `view` and the new best block in one atomic batch.
    ///
    /// On failure nothing is applied and the previous best block stays in place.
    pub fn batch_write(&self, view: CoinViewCache<'_>, best_block: H256) -> StoreResult<BatchWriteSummary> {
        self.write_changes(view.into_changes(), best_block)
    }

    /// Commit already drained overlay changes.
    pub fn write_changes(&self, changes: CoinChanges, best_block: H256) -> StoreResult<BatchWriteSummary> {
        let summary = BatchWriteSummary {
            puts: changes.writes.len(),
            deletes: changes.erasures.len(),
        };

        let mut operations = Vec::with_capacity(summary.puts + summary.deletes + 1);
        for outpoint in &changes.erasures {
            operations.push(BatchOperation::delete(keys::coin_key(outpoint)));
        }
        for (outpoint, coin) in &changes.writes {
            let value = bincode::serialize(coin)?;
            operations.push(BatchOperation::put(keys::coin_key(outpoint), value));
        }
        operations.push(BatchOperation::put(
            keys::singleton(keys::BEST_BLOCK),
            best_block.as_bytes().to_vec(),
        ));

        self.store.atomic_batch_write(operations)?;

        debug!(
            "[coin-state] committed {} coins, erased {}, best block {:?}",
            summary.puts, summary.deletes, best_block
        );
        Ok(summary)
    }

    /// Scan the whole coin set.
    pub fn stats(&self) -> StoreResult<CoinStats> {
        let best_block = self.best_block()?;
        let mut hasher = Sha256::new();
        hasher.update(best_block.as_bytes());

        let mut outputs = 0u64;
        let mut total_amount: Amount = 0;
        for (key, value) in self.store.prefix_scan(&[keys::COIN])? {
            let coin: Coin = decode_coin(&key, &value)?;
            hasher.update(&key);
            hasher.update(&value);
            outputs += 1;
            total_amount = total_amount.saturating_add(coin.value());
        }

        let stats = CoinStats {
            best_block,
            outputs,
            total_amount,
            serialized_hash: H256::from_slice(&hasher.finalize()),
        };
        info!(
            "[coin-state] coin set at {:?}: {} outputs, total {}",
            stats.best_block, stats.outputs, stats.total_amount
        );
        Ok(stats)
    }
}

fn decode_coin(key: &[u8], value: &[u8]) -> StoreResult<Coin> {
    bincode::deserialize(value).map_err(|_| StoreError::Corrupted {
        key: hex::encode(key),
    })
}

impl<S: KeyValueStore> CoinSource for CoinStore<S> {
    fn coin(&self, outpoint: &OutPoint) -> StoreResult<Option<Coin>> {
        let key = keys::coin_key(outpoint);
        match self.store.get(&key)? {
            Some(value) => decode_coin(&key, &value).map(Some),
            None => Ok(None),
        }
    }

    fn has_coin(&self, outpoint: &OutPoint) -> StoreResult<bool> {
        self.store.exists(&keys::coin_key(outpoint))
    }

    fn best_block(&self) -> StoreResult<H256> {
        match self.store.get(&keys::singleton(keys::BEST_BLOCK))? {
            Some(bytes) if bytes.len() == 32 => Ok(H256::from_slice(&bytes)),
            Some(_) => Err(StoreError::Corrupted {
                key: hex::encode([keys::BEST_BLOCK]),
            }),
            None => Ok(H256::zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;
    use chain_types::{Transaction, TxIn, TxOut, COIN};

    /// Store whose batch writes always fail.
    struct FailingBatchStore {
        inner: InMemoryKVStore,
    }

    impl KeyValueStore for FailingBatchStore {
        fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
        fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
            self.inner.put(key, value)
        }
        fn delete(&self, key: &[u8]) -> StoreResult<()> {
            self.inner.delete(key)
        }
        fn atomic_batch_write(&self, _operations: Vec<BatchOperation>) -> StoreResult<()> {
            Err(StoreError::Io {
                message: "simulated crash".into(),
            })
        }
        fn exists(&self, key: &[u8]) -> StoreResult<bool> {
            self.inner.exists(key)
        }
        fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
            self.inner.prefix_scan(prefix)
        }
    }

    /// Store that records every batch and counts writes made outside one.
    struct RecordingStore {
        inner: InMemoryKVStore,
        batches: parking_lot::Mutex<Vec<Vec<BatchOperation>>>,
        loose_writes: std::sync::atomic::AtomicUsize,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryKVStore::new(),
                batches: parking_lot::Mutex::new(Vec::new()),
                loose_writes: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn loose_writes(&self) -> usize {
            self.loose_writes.load(std::sync::atomic::Ordering::Relaxed)
        }
    }

    impl KeyValueStore for RecordingStore {
        fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
        fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
            self.loose_writes
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.inner.put(key, value)
        }
        fn delete(&self, key: &[u8]) -> StoreResult<()> {
            self.loose_writes
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.inner.delete(key)
        }
        fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> StoreResult<()> {
            self.batches.lock().push(operations.clone());
            self.inner.atomic_batch_write(operations)
        }
        fn exists(&self, key: &[u8]) -> StoreResult<bool> {
            self.inner.exists(key)
        }
        fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
            self.inner.prefix_scan(prefix)
        }
    }

    fn seed<S: KeyValueStore>(db: &CoinStore<S>, outpoint: OutPoint, value: Amount) {
        let mut view = CoinViewCache::new(db);
        view.add_coin(outpoint, Coin::new(TxOut::new(value, vec![0xac]), 1));
        db.batch_write(view, H256::repeat_byte(1)).unwrap();
    }

    fn spend_all(prevout: OutPoint, value: Amount) -> Transaction {
        Transaction::new(
            vec![TxIn::spend(prevout, vec![])],
            vec![TxOut::new(value, vec![0x51])],
        )
    }

    #[test]
    fn test_empty_store_has_zero_best_block() {
        let db = CoinStore::new(Arc::new(InMemoryKVStore::new()));
        assert_eq!(db.best_block().unwrap(), H256::zero());
    }

    #[test]
    fn test_commit_applies_puts_and_deletes() {
        let db = CoinStore::new(Arc::new(InMemoryKVStore::new()));
        let funding = OutPoint::new(H256::repeat_byte(9), 0);
        seed(&db, funding, COIN);
        assert!(db.has_coin(&funding).unwrap());

        let tx = spend_all(funding, COIN);
        let mut view = CoinViewCache::new(&db);
        view.apply_transaction(&tx, 2).unwrap();
        let summary = db.batch_write(view, H256::repeat_byte(2)).unwrap();

        assert_eq!(summary, BatchWriteSummary { puts: 1, deletes: 1 });
        assert!(!db.has_coin(&funding).unwrap());
        let created = db.coin(&OutPoint::new(tx.txid(), 0)).unwrap().unwrap();
        assert_eq!(created.height, 2);
        assert_eq!(db.best_block().unwrap(), H256::repeat_byte(2));
    }

    #[test]
    fn test_commit_is_one_batch_with_delete_put_and_best_block() {
        let db = CoinStore::new(Arc::new(RecordingStore::new()));
        let spent = OutPoint::new(H256::repeat_byte(9), 0);
        let untouched = OutPoint::new(H256::repeat_byte(8), 1);
        seed(&db, spent, COIN);
        seed(&db, untouched, 2 * COIN);
        db.store().batches.lock().clear();

        let tx = spend_all(spent, COIN);
        let created = OutPoint::new(tx.txid(), 0);
        let mut view = CoinViewCache::new(&db);
        // Read-only access leaves a clean entry that must not be written back.
        assert!(view.access_coin(&untouched).unwrap().is_some());
        view.apply_transaction(&tx, 2).unwrap();
        let expected_coin = bincode::serialize(&Coin::from_transaction(&tx, 0, 2).unwrap()).unwrap();

        db.batch_write(view, H256::repeat_byte(2)).unwrap();

        let batches = db.store().batches.lock().clone();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![
                BatchOperation::delete(keys::coin_key(&spent)),
                BatchOperation::put(keys::coin_key(&created), expected_coin),
                BatchOperation::put(
                    keys::singleton(keys::BEST_BLOCK),
                    H256::repeat_byte(2).as_bytes().to_vec()
                ),
            ]
        );
        assert_eq!(db.store().loose_writes(), 0);
        assert!(db.has_coin(&untouched).unwrap());
    }

    #[test]
    fn test_failed_commit_leaves_state_untouched() {
        let inner = InMemoryKVStore::new();
        let seeded = CoinStore::new(Arc::new(InMemoryKVStore::new()));
        let funding = OutPoint::new(H256::repeat_byte(9), 0);
        seed(&seeded, funding, COIN);
        for (key, value) in seeded.store().prefix_scan(&[]).unwrap() {
            inner.put(&key, &value).unwrap();
        }

        let db = CoinStore::new(Arc::new(FailingBatchStore { inner }));
        let mut view = CoinViewCache::new(&db);
        view.apply_transaction(&spend_all(funding, COIN), 2).unwrap();

        let err = db.batch_write(view, H256::repeat_byte(2)).unwrap_err();
        assert!(err.is_recoverable());
        assert!(db.has_coin(&funding).unwrap());
        assert_eq!(db.best_block().unwrap(), H256::repeat_byte(1));
    }

    #[test]
    fn test_stats_counts_outputs() {
        let db = CoinStore::new(Arc::new(InMemoryKVStore::new()));
        seed(&db, OutPoint::new(H256::repeat_byte(1), 0), COIN);
        seed(&db, OutPoint::new(H256::repeat_byte(2), 3), 2 * COIN);

        let stats = db.stats().unwrap();
        assert_eq!(stats.outputs, 2);
        assert_eq!(stats.total_amount, 3 * COIN);

        let again = db.stats().unwrap();
        assert_eq!(stats.serialized_hash, again.serialized_hash);
    }

    #[test]
    fn test_corrupted_coin_is_reported() {
        let store = Arc::new(InMemoryKVStore::new());
        let outpoint = OutPoint::new(H256::repeat_byte(3), 0);
        store.put(&keys::coin_key(&outpoint), &[0xff]).unwrap();
        let db = CoinStore::new(store);

        assert!(matches!(db.coin(&outpoint), Err(StoreError::Corrupted { .. })));
    }
}
