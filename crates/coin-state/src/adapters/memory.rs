//! In-memory key-value store.
//!
//! Ordered map behind a `parking_lot::RwLock`. Batches are staged on a copy and
//! swapped in only when every operation has been applied.

use crate::error::StoreResult;
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory key-value store for tests and ephemeral nodes.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKVStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> StoreResult<()> {
        let mut data = self.data.write();
        let mut staged = data.clone();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    staged.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    staged.remove(&key);
                }
            }
        }
        *data = staged;
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = InMemoryKVStore::new();
        store.put(b"key1", b"value1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert!(store.exists(b"key1").unwrap());

        store.delete(b"key1").unwrap();
        assert!(!store.exists(b"key1").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_batch_applies_in_order() {
        let store = InMemoryKVStore::new();
        store.put(b"gone", b"x").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"a".to_vec(), b"1".to_vec()),
                BatchOperation::put(b"a".to_vec(), b"2".to_vec()),
                BatchOperation::delete(b"gone".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"2".to_vec()));
        assert!(!store.exists(b"gone").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_prefix_scan_is_ordered_and_bounded() {
        let store = InMemoryKVStore::new();
        store.put(b"block:0003", b"c").unwrap();
        store.put(b"block:0001", b"a").unwrap();
        store.put(b"block:0002", b"b").unwrap();
        store.put(b"blocz", b"z").unwrap();
        store.put(b"tx:0001", b"t").unwrap();

        let keys: Vec<Vec<u8>> = store
            .prefix_scan(b"block:")
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(
            keys,
            vec![b"block:0001".to_vec(), b"block:0002".to_vec(), b"block:0003".to_vec()]
        );
    }
}
