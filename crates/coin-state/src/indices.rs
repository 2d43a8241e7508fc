//! Optional secondary indices: address history, address unspent outputs,
//! spent outputs, block timestamps and transaction positions.
//!
//! Each update is one atomic batch. An index that is disabled in
//! [`IndexFlags`] turns its writes into no-ops and its reads into empty
//! results, so it never stands in the way of the primary commit.

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::ports::{BatchOperation, KeyValueStore};
use chain_types::Amount;
use primitive_types::H256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// Runtime switches for the secondary indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexFlags {
    /// Address history and address unspent outputs.
    pub address_index: bool,
    /// Spending input per output.
    pub spent_index: bool,
    /// Blocks by timestamp.
    pub timestamp_index: bool,
    /// Transaction disk positions.
    pub tx_index: bool,
}

impl IndexFlags {
    /// Every index enabled.
    pub fn all() -> Self {
        Self {
            address_index: true,
            spent_index: true,
            timestamp_index: true,
            tx_index: true,
        }
    }
}

/// 20-byte address hash.
pub type AddressHash = [u8; 20];

/// One credit or debit of an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressIndexKey {
    /// Script type tag (1 = pubkey hash, 2 = script hash).
    pub address_type: u8,
    /// Address hash.
    pub address: AddressHash,
    /// Height of the block.
    pub height: u32,
    /// Transaction touching the address.
    pub txid: H256,
    /// Output index, or input index when `spending`.
    pub index: u32,
    /// Whether the entry is a debit.
    pub spending: bool,
}

impl AddressIndexKey {
    fn address_prefix(prefix: u8, address_type: u8, address: &AddressHash) -> Vec<u8> {
        let mut key = Vec::with_capacity(66);
        key.push(prefix);
        key.push(address_type);
        key.extend_from_slice(address);
        key
    }

    fn encode(&self) -> Vec<u8> {
        let mut key = Self::address_prefix(keys::ADDRESS, self.address_type, &self.address);
        key.extend_from_slice(&self.height.to_be_bytes());
        key.extend_from_slice(self.txid.as_bytes());
        key.extend_from_slice(&self.index.to_be_bytes());
        key.push(u8::from(self.spending));
        key
    }

    fn decode(key: &[u8]) -> Option<Self> {
        if key.len() != 63 || key[0] != keys::ADDRESS {
            return None;
        }
        Some(Self {
            address_type: key[1],
            address: key[2..22].try_into().ok()?,
            height: u32::from_be_bytes(key[22..26].try_into().ok()?),
            txid: H256::from_slice(&key[26..58]),
            index: u32::from_be_bytes(key[58..62].try_into().ok()?),
            spending: key[62] != 0,
        })
    }
}

/// Unspent output of an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressUnspentKey {
    /// Script type tag.
    pub address_type: u8,
    /// Address hash.
    pub address: AddressHash,
    /// Funding transaction.
    pub txid: H256,
    /// Output index.
    pub index: u32,
}

impl AddressUnspentKey {
    fn encode(&self) -> Vec<u8> {
        let mut key =
            AddressIndexKey::address_prefix(keys::ADDRESS_UNSPENT, self.address_type, &self.address);
        key.extend_from_slice(self.txid.as_bytes());
        key.extend_from_slice(&self.index.to_be_bytes());
        key
    }

    fn decode(key: &[u8]) -> Option<Self> {
        if key.len() != 58 || key[0] != keys::ADDRESS_UNSPENT {
            return None;
        }
        Some(Self {
            address_type: key[1],
            address: key[2..22].try_into().ok()?,
            txid: H256::from_slice(&key[22..54]),
            index: u32::from_be_bytes(key[54..58].try_into().ok()?),
        })
    }
}

/// Value stored for an address unspent output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressUnspentValue {
    /// Output value.
    pub amount: Amount,
    /// Locking script.
    pub script: Vec<u8>,
    /// Height of the funding block.
    pub height: u32,
}

/// Output whose spender is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpentIndexKey {
    /// Funding transaction.
    pub txid: H256,
    /// Output index.
    pub index: u32,
}

impl SpentIndexKey {
    fn encode(&self) -> Vec<u8> {
        let mut key = keys::hash_key(keys::SPENT, &self.txid);
        key.extend_from_slice(&self.index.to_be_bytes());
        key
    }
}

/// Spender of an output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentIndexValue {
    /// Spending transaction.
    pub txid: H256,
    /// Input index in the spending transaction.
    pub input_index: u32,
    /// Height of the spending block.
    pub height: u32,
    /// Value of the spent output.
    pub amount: Amount,
    /// Script type tag of the spent output.
    pub address_type: u8,
    /// Address hash of the spent output.
    pub address: AddressHash,
}

/// Position of a transaction in the block files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskTxPos {
    /// Block file number.
    pub file: i32,
    /// Offset of the block in the file.
    pub block_pos: u32,
    /// Offset of the transaction after the block header.
    pub tx_offset: u32,
}

/// Secondary index storage.
pub struct SecondaryIndexStore<S: KeyValueStore> {
    store: Arc<S>,
    flags: IndexFlags,
}

fn encode_value<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|_| StoreError::Corrupted {
        key: hex::encode(key),
    })
}

impl<S: KeyValueStore> SecondaryIndexStore<S> {
    /// Index store over `store` with the given switches.
    pub fn new(store: Arc<S>, flags: IndexFlags) -> Self {
        Self { store, flags }
    }

    /// Active switches.
    pub fn flags(&self) -> IndexFlags {
        self.flags
    }

    fn commit(&self, enabled: bool, operations: Vec<BatchOperation>) -> StoreResult<()> {
        if !enabled || operations.is_empty() {
            return Ok(());
        }
        self.store.atomic_batch_write(operations)
    }

    /// Record address credits and debits.
    pub fn write_address_index(&self, entries: &[(AddressIndexKey, Amount)]) -> StoreResult<()> {
        let operations = entries
            .iter()
            .map(|(key, amount)| BatchOperation::put(key.encode(), amount.to_le_bytes().to_vec()))
            .collect();
        self.commit(self.flags.address_index, operations)
    }

    /// Remove address entries (block disconnect).
    pub fn erase_address_index(&self, entries: &[(AddressIndexKey, Amount)]) -> StoreResult<()> {
        let operations = entries
            .iter()
            .map(|(key, _)| BatchOperation::delete(key.encode()))
            .collect();
        self.commit(self.flags.address_index, operations)
    }

    /// History of an address between two heights (inclusive). `end == 0` means no upper bound.
    pub fn read_address_index(
        &self,
        address_type: u8,
        address: &AddressHash,
        start: u32,
        end: u32,
    ) -> StoreResult<Vec<(AddressIndexKey, Amount)>> {
        if !self.flags.address_index {
            return Ok(Vec::new());
        }
        let prefix = AddressIndexKey::address_prefix(keys::ADDRESS, address_type, address);
        let mut out = Vec::new();
        for (raw_key, value) in self.store.prefix_scan(&prefix)? {
            let key = AddressIndexKey::decode(&raw_key).ok_or_else(|| StoreError::Corrupted {
                key: hex::encode(&raw_key),
            })?;
            if key.height < start || (end > 0 && key.height > end) {
                continue;
            }
            let amount: [u8; 8] = value.as_slice().try_into().map_err(|_| StoreError::Corrupted {
                key: hex::encode(&raw_key),
            })?;
            out.push((key, Amount::from_le_bytes(amount)));
        }
        Ok(out)
    }

    /// Apply unspent-output changes; `None` erases the entry.
    pub fn update_address_unspent_index(
        &self,
        entries: &[(AddressUnspentKey, Option<AddressUnspentValue>)],
    ) -> StoreResult<()> {
        let mut operations = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            operations.push(match value {
                Some(value) => BatchOperation::put(key.encode(), encode_value(value)?),
                None => BatchOperation::delete(key.encode()),
            });
        }
        self.commit(self.flags.address_index, operations)
    }

    /// Unspent outputs of an address.
    pub fn read_address_unspent_index(
        &self,
        address_type: u8,
        address: &AddressHash,
    ) -> StoreResult<Vec<(AddressUnspentKey, AddressUnspentValue)>> {
        if !self.flags.address_index {
            return Ok(Vec::new());
        }
        let prefix = AddressIndexKey::address_prefix(keys::ADDRESS_UNSPENT, address_type, address);
        self.store
            .prefix_scan(&prefix)?
            .into_iter()
            .map(|(raw_key, value)| {
                let key = AddressUnspentKey::decode(&raw_key).ok_or_else(|| StoreError::Corrupted {
                    key: hex::encode(&raw_key),
                })?;
                Ok((key, decode_value(&raw_key, &value)?))
            })
            .collect()
    }

    /// Apply spender changes; `None` erases the entry.
    pub fn update_spent_index(
        &self,
        entries: &[(SpentIndexKey, Option<SpentIndexValue>)],
    ) -> StoreResult<()> {
        let mut operations = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            operations.push(match value {
                Some(value) => BatchOperation::put(key.encode(), encode_value(value)?),
                None => BatchOperation::delete(key.encode()),
            });
        }
        self.commit(self.flags.spent_index, operations)
    }

    /// Spender of an output.
    pub fn read_spent_index(&self, key: &SpentIndexKey) -> StoreResult<Option<SpentIndexValue>> {
        if !self.flags.spent_index {
            return Ok(None);
        }
        let raw_key = key.encode();
        match self.store.get(&raw_key)? {
            Some(bytes) => decode_value(&raw_key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Record a block under its timestamp.
    pub fn write_timestamp_index(&self, timestamp: u32, block_hash: H256) -> StoreResult<()> {
        let mut key = vec![keys::TIMESTAMP];
        key.extend_from_slice(&timestamp.to_be_bytes());
        key.extend_from_slice(block_hash.as_bytes());
        self.commit(self.flags.timestamp_index, vec![BatchOperation::put(key, Vec::new())])
    }

    /// Blocks with `low <= timestamp < high`, oldest first.
    pub fn read_timestamp_index(&self, high: u32, low: u32) -> StoreResult<Vec<H256>> {
        if !self.flags.timestamp_index {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for (key, _) in self.store.prefix_scan(&[keys::TIMESTAMP])? {
            if key.len() != 37 {
                return Err(StoreError::Corrupted {
                    key: hex::encode(&key),
                });
            }
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&key[1..5]);
            let timestamp = u32::from_be_bytes(raw);
            if timestamp >= high {
                break;
            }
            if timestamp >= low {
                out.push(H256::from_slice(&key[5..37]));
            }
        }
        Ok(out)
    }

    /// Record transaction positions.
    pub fn write_tx_index(&self, entries: &[(H256, DiskTxPos)]) -> StoreResult<()> {
        let mut operations = Vec::with_capacity(entries.len());
        for (txid, pos) in entries {
            operations.push(BatchOperation::put(
                keys::hash_key(keys::TX_INDEX, txid),
                encode_value(pos)?,
            ));
        }
        self.commit(self.flags.tx_index, operations)
    }

    /// Position of a transaction.
    pub fn read_tx_index(&self, txid: &H256) -> StoreResult<Option<DiskTxPos>> {
        if !self.flags.tx_index {
            return Ok(None);
        }
        let key = keys::hash_key(keys::TX_INDEX, txid);
        match self.store.get(&key)? {
            Some(bytes) => decode_value(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;
    use chain_types::COIN;

    const ALICE: AddressHash = [0xa1; 20];
    const BOB: AddressHash = [0xb0; 20];

    fn entry(address: AddressHash, height: u32, n: u8, spending: bool) -> AddressIndexKey {
        AddressIndexKey {
            address_type: 1,
            address,
            height,
            txid: H256::repeat_byte(n),
            index: 0,
            spending,
        }
    }

    fn enabled() -> (Arc<InMemoryKVStore>, SecondaryIndexStore<InMemoryKVStore>) {
        let kv = Arc::new(InMemoryKVStore::new());
        (kv.clone(), SecondaryIndexStore::new(kv, IndexFlags::all()))
    }

    #[test]
    fn test_address_history_by_height_range() {
        let (_, index) = enabled();
        index
            .write_address_index(&[
                (entry(ALICE, 10, 1, false), COIN),
                (entry(ALICE, 20, 2, true), -COIN),
                (entry(ALICE, 30, 3, false), 2 * COIN),
                (entry(BOB, 20, 4, false), 5 * COIN),
            ])
            .unwrap();

        let all = index.read_address_index(1, &ALICE, 0, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].0, entry(ALICE, 20, 2, true));
        assert_eq!(all[1].1, -COIN);

        let middle = index.read_address_index(1, &ALICE, 15, 25).unwrap();
        assert_eq!(middle.len(), 1);

        index
            .erase_address_index(&[(entry(ALICE, 30, 3, false), 2 * COIN)])
            .unwrap();
        assert_eq!(index.read_address_index(1, &ALICE, 0, 0).unwrap().len(), 2);
    }

    #[test]
    fn test_unspent_and_spent_updates() {
        let (_, index) = enabled();
        let key = AddressUnspentKey {
            address_type: 1,
            address: ALICE,
            txid: H256::repeat_byte(1),
            index: 2,
        };
        let value = AddressUnspentValue {
            amount: COIN,
            script: vec![0xac],
            height: 10,
        };
        index
            .update_address_unspent_index(&[(key, Some(value.clone()))])
            .unwrap();
        assert_eq!(
            index.read_address_unspent_index(1, &ALICE).unwrap(),
            vec![(key, value)]
        );
        index.update_address_unspent_index(&[(key, None)]).unwrap();
        assert!(index.read_address_unspent_index(1, &ALICE).unwrap().is_empty());

        let spent_key = SpentIndexKey {
            txid: H256::repeat_byte(1),
            index: 2,
        };
        let spender = SpentIndexValue {
            txid: H256::repeat_byte(2),
            input_index: 0,
            height: 11,
            amount: COIN,
            address_type: 1,
            address: ALICE,
        };
        index
            .update_spent_index(&[(spent_key, Some(spender.clone()))])
            .unwrap();
        assert_eq!(index.read_spent_index(&spent_key).unwrap(), Some(spender));
    }

    #[test]
    fn test_timestamp_range() {
        let (_, index) = enabled();
        index.write_timestamp_index(100, H256::repeat_byte(1)).unwrap();
        index.write_timestamp_index(200, H256::repeat_byte(2)).unwrap();
        index.write_timestamp_index(300, H256::repeat_byte(3)).unwrap();

        assert_eq!(
            index.read_timestamp_index(300, 100).unwrap(),
            vec![H256::repeat_byte(1), H256::repeat_byte(2)]
        );
    }

    #[test]
    fn test_tx_index() {
        let (_, index) = enabled();
        let pos = DiskTxPos {
            file: 3,
            block_pos: 1024,
            tx_offset: 81,
        };
        index.write_tx_index(&[(H256::repeat_byte(7), pos)]).unwrap();
        assert_eq!(index.read_tx_index(&H256::repeat_byte(7)).unwrap(), Some(pos));
        assert_eq!(index.read_tx_index(&H256::repeat_byte(8)).unwrap(), None);
    }

    #[test]
    fn test_disabled_indices_are_noops() {
        let kv = Arc::new(InMemoryKVStore::new());
        let index = SecondaryIndexStore::new(kv.clone(), IndexFlags::default());

        index
            .write_address_index(&[(entry(ALICE, 1, 1, false), COIN)])
            .unwrap();
        index.write_timestamp_index(5, H256::repeat_byte(1)).unwrap();
        index
            .write_tx_index(&[(H256::repeat_byte(1), DiskTxPos { file: 0, block_pos: 0, tx_offset: 0 })])
            .unwrap();

        assert!(kv.is_empty());
        assert!(index.read_address_index(1, &ALICE, 0, 0).unwrap().is_empty());
    }
}
