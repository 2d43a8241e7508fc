//! # Block Index Store
//!
//! Durable block-index records, small chain-state markers, and the in-memory
//! block tree rebuilt from them at startup.
//!
//! ## Reconstruction
//!
//! ```text
//! stream 'b' prefix ──► decode record ──► arena slot (placeholder for unseen prev)
//!                                   │
//!                                   ├─► header hash == stored hash?
//!                                   ├─► PoW height? check target
//!                                   └─► new accumulator checkpoint? load snapshot
//! link prev/next ──► recompute height + chain work ──► best tip by most work
//! ```
//!
//! Every failure during reconstruction is fatal: a node must not start on a
//! block tree it cannot trust.

use crate::error::{BlockIndexError, StoreError, StoreResult};
use crate::keys;
use crate::ports::{BatchOperation, KeyValueStore};
use chain_types::{Amount, BlockHeader, ChainParams, DifficultyOracle};
use primitive_types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Header fields are valid.
pub const BLOCK_VALID_HEADER: u32 = 1;
/// Parent is known and the header connects to the tree.
pub const BLOCK_VALID_TREE: u32 = 2;
/// Transactions passed context-free checks.
pub const BLOCK_VALID_TRANSACTIONS: u32 = 3;
/// Full block data is stored.
pub const BLOCK_HAVE_DATA: u32 = 8;
/// Undo data is stored.
pub const BLOCK_HAVE_UNDO: u32 = 16;
/// Block failed validation.
pub const BLOCK_FAILED_VALID: u32 = 32;

/// Accumulator values per denomination, as opaque serialized group elements.
pub type AccumulatorValues = BTreeMap<Amount, Vec<u8>>;

/// Persisted block-index record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskBlockIndex {
    /// Block hash.
    pub hash: H256,
    /// Parent hash (zero for genesis).
    pub prev_hash: H256,
    /// Height.
    pub height: u32,
    /// Header version.
    pub version: i32,
    /// Merkle root.
    pub merkle_root: H256,
    /// Header time.
    pub time: u32,
    /// Compact target.
    pub bits: u32,
    /// Header nonce.
    pub nonce: u32,
    /// Validation and data-availability flags.
    pub status: u32,
    /// Transactions in the block.
    pub tx_count: u32,
    /// Block file number.
    pub file: i32,
    /// Offset of the block in its file.
    pub data_pos: u32,
    /// Offset of the undo data in its file.
    pub undo_pos: u32,
    /// Shielded accumulator checkpoint committed by the header.
    pub accumulator_checkpoint: H256,
    /// Shielded coins minted in this block, per denomination.
    pub minted_denominations: BTreeMap<Amount, u32>,
    /// Shielded supply after this block, per denomination.
    pub denomination_supply: BTreeMap<Amount, i64>,
    /// Money supply after this block.
    pub money_supply: Amount,
    /// Stake modifier.
    pub stake_modifier: u64,
    /// Block is proof of stake.
    pub proof_of_stake: bool,
}

impl DiskBlockIndex {
    /// Header reconstructed from the record.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            version: self.version,
            prev_block: self.prev_hash,
            merkle_root: self.merkle_root,
            time: self.time,
            bits: self.bits,
            nonce: self.nonce,
            accumulator_checkpoint: self.accumulator_checkpoint,
        }
    }

    /// Whether all `flags` are set.
    pub fn has_status(&self, flags: u32) -> bool {
        self.status & flags == flags
    }
}

/// One node of the in-memory block tree.
#[derive(Clone, Debug)]
pub struct BlockIndexEntry {
    /// Block hash.
    pub hash: H256,
    /// Stored record; `None` for a parent referenced but never stored.
    pub record: Option<DiskBlockIndex>,
    /// Arena slot of the parent.
    pub prev: Option<usize>,
    /// Arena slot of the successor on the best chain.
    pub next: Option<usize>,
    /// Height (recomputed from the parent when linked).
    pub height: u32,
    /// Cumulative work up to and including this block.
    pub chain_work: U256,
}

/// Arena of block-index entries addressed by slot and by hash.
#[derive(Debug, Default)]
pub struct BlockIndex {
    entries: Vec<BlockIndexEntry>,
    by_hash: HashMap<H256, usize>,
    best: Option<usize>,
}

impl BlockIndex {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `hash`, inserting a placeholder when unseen.
    pub fn insert_placeholder(&mut self, hash: H256) -> usize {
        if let Some(&slot) = self.by_hash.get(&hash) {
            return slot;
        }
        let slot = self.entries.len();
        self.entries.push(BlockIndexEntry {
            hash,
            record: None,
            prev: None,
            next: None,
            height: 0,
            chain_work: U256::zero(),
        });
        self.by_hash.insert(hash, slot);
        slot
    }

    /// Slot of `hash`.
    pub fn slot_of(&self, hash: &H256) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    /// Entry at `slot`.
    pub fn entry(&self, slot: usize) -> Option<&BlockIndexEntry> {
        self.entries.get(slot)
    }

    /// Entry for `hash`.
    pub fn get(&self, hash: &H256) -> Option<&BlockIndexEntry> {
        self.slot_of(hash).and_then(|slot| self.entry(slot))
    }

    /// Number of entries, placeholders included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tip with the most cumulative work.
    pub fn best_tip(&self) -> Option<&BlockIndexEntry> {
        self.best.and_then(|slot| self.entry(slot))
    }

    /// Walk from `hash` back to the first block.
    pub fn ancestors(&self, hash: &H256) -> impl Iterator<Item = &BlockIndexEntry> + '_ {
        let mut cursor = self.slot_of(hash);
        std::iter::from_fn(move || {
            let entry = self.entry(cursor?)?;
            cursor = entry.prev;
            Some(entry)
        })
    }

    /// Walk the best chain from its first block forward along `next`.
    pub fn best_chain(&self) -> impl Iterator<Item = &BlockIndexEntry> + '_ {
        let mut cursor = self
            .best
            .map(|slot| {
                let mut first = slot;
                while let Some(prev) = self.entries[first].prev {
                    first = prev;
                }
                first
            });
        std::iter::from_fn(move || {
            let entry = self.entry(cursor?)?;
            cursor = entry.next;
            Some(entry)
        })
    }

    fn set_record(&mut self, record: DiskBlockIndex) {
        let slot = self.insert_placeholder(record.hash);
        let prev = if record.prev_hash.is_zero() {
            None
        } else {
            Some(self.insert_placeholder(record.prev_hash))
        };
        let entry = &mut self.entries[slot];
        entry.height = record.height;
        entry.prev = prev;
        entry.record = Some(record);
    }

    /// Recompute heights and chain work, pick the best tip and thread `next` along it.
    fn finish_linking(&mut self) {
        let mut order: Vec<usize> = (0..self.entries.len())
            .filter(|&slot| self.entries[slot].record.is_some())
            .collect();
        order.sort_by_key(|&slot| self.entries[slot].height);

        for &slot in &order {
            let (height, parent_work) = match self.entries[slot].prev {
                Some(prev) if self.entries[prev].record.is_some() => {
                    (self.entries[prev].height + 1, self.entries[prev].chain_work)
                }
                _ => (self.entries[slot].height, U256::zero()),
            };
            let bits = self.entries[slot].record.as_ref().map_or(0, |r| r.bits);
            let entry = &mut self.entries[slot];
            entry.height = height;
            entry.chain_work = parent_work.saturating_add(DifficultyOracle::block_proof(bits));
        }

        self.best = order
            .iter()
            .copied()
            .max_by(|&a, &b| {
                self.entries[a]
                    .chain_work
                    .cmp(&self.entries[b].chain_work)
                    .then_with(|| self.entries[b].height.cmp(&self.entries[a].height))
            });

        for entry in &mut self.entries {
            entry.next = None;
        }
        let mut cursor = self.best;
        while let Some(slot) = cursor {
            let prev = self.entries[slot].prev;
            if let Some(prev_slot) = prev {
                self.entries[prev_slot].next = Some(slot);
            }
            cursor = prev;
        }
    }
}

/// Stored accumulator values, keyed by checkpoint, with an in-memory cache.
pub struct AccumulatorSnapshots<S: KeyValueStore> {
    store: Arc<S>,
    loaded: HashMap<H256, AccumulatorValues>,
}

impl<S: KeyValueStore> AccumulatorSnapshots<S> {
    /// Snapshot store over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            loaded: HashMap::new(),
        }
    }

    /// Persist the values behind `checkpoint`.
    pub fn write_snapshot(&mut self, checkpoint: H256, values: AccumulatorValues) -> StoreResult<()> {
        let bytes = bincode::serialize(&values)?;
        self.store
            .put(&keys::hash_key(keys::ACCUMULATOR, &checkpoint), &bytes)?;
        self.loaded.insert(checkpoint, values);
        Ok(())
    }

    /// Load the values behind `checkpoint` into the cache.
    pub fn load(&mut self, checkpoint: &H256) -> StoreResult<Option<&AccumulatorValues>> {
        if !self.loaded.contains_key(checkpoint) {
            let key = keys::hash_key(keys::ACCUMULATOR, checkpoint);
            let Some(bytes) = self.store.get(&key)? else {
                return Ok(None);
            };
            let values: AccumulatorValues =
                bincode::deserialize(&bytes).map_err(|_| StoreError::Corrupted {
                    key: hex::encode(&key),
                })?;
            self.loaded.insert(*checkpoint, values);
        }
        Ok(self.loaded.get(checkpoint))
    }

    /// Cached values for `checkpoint`.
    pub fn get(&self, checkpoint: &H256) -> Option<&AccumulatorValues> {
        self.loaded.get(checkpoint)
    }
}

/// Block-index records and chain-state markers.
pub struct BlockTreeStore<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> BlockTreeStore<S> {
    /// Block tree over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist one record.
    pub fn write_block_index(&self, record: &DiskBlockIndex) -> StoreResult<()> {
        let bytes = bincode::serialize(record)?;
        self.store
            .put(&keys::hash_key(keys::BLOCK_INDEX, &record.hash), &bytes)
    }

    /// Persist several records and the last block file number atomically.
    pub fn write_batch(&self, records: &[DiskBlockIndex], last_file: i32) -> StoreResult<()> {
        let mut operations = Vec::with_capacity(records.len() + 1);
        for record in records {
            operations.push(BatchOperation::put(
                keys::hash_key(keys::BLOCK_INDEX, &record.hash),
                bincode::serialize(record)?,
            ));
        }
        operations.push(BatchOperation::put(
            keys::singleton(keys::LAST_BLOCK_FILE),
            last_file.to_le_bytes().to_vec(),
        ));
        self.store.atomic_batch_write(operations)
    }

    /// Record for `hash`.
    pub fn read_block_index(&self, hash: &H256) -> StoreResult<Option<DiskBlockIndex>> {
        let key = keys::hash_key(keys::BLOCK_INDEX, hash);
        match self.store.get(&key)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|_| StoreError::Corrupted {
                    key: hex::encode(&key),
                }),
            None => Ok(None),
        }
    }

    /// Store a named boolean flag.
    pub fn write_flag(&self, name: &str, value: bool) -> StoreResult<()> {
        let byte = if value { b'1' } else { b'0' };
        self.store.put(&keys::flag_key(name), &[byte])
    }

    /// Named boolean flag, `None` if never written.
    pub fn read_flag(&self, name: &str) -> StoreResult<Option<bool>> {
        Ok(self
            .store
            .get(&keys::flag_key(name))?
            .map(|bytes| bytes.first() == Some(&b'1')))
    }

    /// Mark or clear an in-progress reindex.
    pub fn write_reindexing(&self, reindexing: bool) -> StoreResult<()> {
        let key = keys::singleton(keys::REINDEX);
        if reindexing {
            self.store.put(&key, b"1")
        } else {
            self.store.delete(&key)
        }
    }

    /// Whether a reindex was interrupted.
    pub fn is_reindexing(&self) -> StoreResult<bool> {
        self.store.exists(&keys::singleton(keys::REINDEX))
    }

    /// Store the last block file number.
    pub fn write_last_block_file(&self, file: i32) -> StoreResult<()> {
        self.store
            .put(&keys::singleton(keys::LAST_BLOCK_FILE), &file.to_le_bytes())
    }

    /// Last block file number.
    pub fn read_last_block_file(&self) -> StoreResult<Option<i32>> {
        let key = keys::singleton(keys::LAST_BLOCK_FILE);
        match self.store.get(&key)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Corrupted {
                        key: hex::encode(&key),
                    }
                })?;
                Ok(Some(i32::from_le_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Rebuild the block tree from every stored record.
    pub fn load_block_index(
        &self,
        params: &ChainParams,
        snapshots: &mut AccumulatorSnapshots<S>,
    ) -> Result<BlockIndex, BlockIndexError> {
        let oracle = DifficultyOracle::for_params(params);
        let mut index = BlockIndex::new();
        let mut last_checkpoint = H256::zero();

        for (key, value) in self.store.prefix_scan(&[keys::BLOCK_INDEX])? {
            let key_hash = keys::hash_from_key(&key).unwrap_or_default();
            let record: DiskBlockIndex = bincode::deserialize(&value)
                .map_err(|_| BlockIndexError::Decode { hash: key_hash })?;

            let computed = record.header().hash();
            if computed != record.hash {
                error!(
                    "[coin-state] index record {:?} does not match its header {:?}",
                    record.hash, computed
                );
                return Err(BlockIndexError::HashMismatch {
                    stored: record.hash,
                    computed,
                });
            }

            if params.is_pow_height(record.height)
                && !oracle.check_proof_of_work(&computed, record.bits)
            {
                error!(
                    "[coin-state] proof of work failed for {:?} at height {}",
                    record.hash, record.height
                );
                return Err(BlockIndexError::ProofOfWork {
                    hash: record.hash,
                    height: record.height,
                });
            }

            if record.accumulator_checkpoint != last_checkpoint {
                last_checkpoint = record.accumulator_checkpoint;
                if !last_checkpoint.is_zero() && snapshots.load(&last_checkpoint)?.is_none() {
                    error!(
                        "[coin-state] no accumulator snapshot for checkpoint {:?}",
                        last_checkpoint
                    );
                    return Err(BlockIndexError::MissingAccumulatorSnapshot {
                        checkpoint: last_checkpoint,
                    });
                }
            }

            debug!("[coin-state] loaded index {:?} height {}", record.hash, record.height);
            index.set_record(record);
        }

        index.finish_linking();

        if let Some(tip) = index.best_tip() {
            info!(
                "[coin-state] block index loaded: {} entries, best {:?} at height {}",
                index.len(),
                tip.hash,
                tip.height
            );
        }
        Ok(index)
    }
}
