//! Deterministic port implementations for tests and local regtest harnesses.
//!
//! Every mock uses interior mutability so a test can keep an `Arc` to it,
//! hand a clone to the assembler or the driver, and keep steering it.
//!
//! ```rust
//! use block_production::test_utils::{FixedClock, MemoryPool};
//! use block_production::ports::{PendingPool, TimeSource};
//!
//! let clock = FixedClock::new(1_000);
//! clock.advance(5);
//! assert_eq!(clock.now(), 1_005);
//! assert!(MemoryPool::default().snapshot().is_empty());
//! ```

use crate::domain::{ChainTip, Coinstake, PoolEntry};
use crate::error::Result;
use crate::ports::outbound::{
    AccumulatorCheckpoints, BlockSubmitter, BlockValidator, ChainView, PeerStatus, PendingPool,
    ShieldedSpendOracle, StakeWallet, TimeSource,
};
use async_trait::async_trait;
use chain_types::script::{pay_to_pubkey_hash, ScriptBuilder};
use chain_types::{
    Amount, Block, Coin, OutPoint, SerialNumber, ShieldedSpend, Transaction, TxIn,
    TxOut,
};
use coin_state::{CoinSource, CoinViewCache, StoreResult};
use parking_lot::{Mutex, RwLock};
use primitive_types::H256;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Compact target that almost every hash satisfies.
pub const EASY_BITS: u32 = 0x207f_ffff;

/// Pay-to-pubkey-hash script for a key filled with `n`.
pub fn p2pkh(n: u8) -> Vec<u8> {
    pay_to_pubkey_hash(&[n; 20])
}

/// Transaction spending `prevouts` into one output of `value`.
pub fn spend_tx(prevouts: &[OutPoint], value: Amount) -> Transaction {
    let script_sig = ScriptBuilder::new().push_data(&[0x30; 9]).into_bytes();
    Transaction::new(
        prevouts
            .iter()
            .map(|prevout| TxIn::spend(*prevout, script_sig.clone()))
            .collect(),
        vec![TxOut::new(value, p2pkh(2))],
    )
}

/// Coinbase-shaped transaction, as a misbehaving pool might hand over.
pub fn coinbase_tx(height: u32, value: Amount) -> Transaction {
    crate::domain::build_coinbase(height, p2pkh(3), value)
}

/// Transaction spending one shielded coin of `denomination` per serial into one output of `value`.
pub fn shielded_spend(serials: &[&[u8]], denomination: Amount, value: Amount) -> Transaction {
    Transaction::new(
        serials
            .iter()
            .map(|serial| {
                TxIn::Shielded(ShieldedSpend {
                    serial: SerialNumber(serial.to_vec()),
                    denomination,
                    accumulator_checksum: 1,
                    proof: vec![0xfe; 16],
                })
            })
            .collect(),
        vec![TxOut::new(value, p2pkh(4))],
    )
}

/// Tip at `height` with no parent summary.
pub fn tip_at(height: u32, time: u32, bits: u32) -> ChainTip {
    ChainTip {
        hash: H256::from_low_u64_be(u64::from(height) + 1),
        height,
        time,
        bits,
        median_time_past: i64::from(time) - 1,
        accumulator_checkpoint: H256::zero(),
        parent: None,
    }
}

/// Confirmed coin set backed by a map.
#[derive(Debug, Default)]
pub struct MapCoinSource {
    coins: RwLock<HashMap<OutPoint, Coin>>,
    best_block: RwLock<H256>,
}

impl MapCoinSource {
    /// Add or replace a coin.
    pub fn insert(&self, outpoint: OutPoint, coin: Coin) {
        self.coins.write().insert(outpoint, coin);
    }

    /// Set the reported best block.
    pub fn set_best_block(&self, hash: H256) {
        *self.best_block.write() = hash;
    }

    /// Number of coins.
    pub fn len(&self) -> usize {
        self.coins.read().len()
    }

    /// Whether no coins are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CoinSource for MapCoinSource {
    fn coin(&self, outpoint: &OutPoint) -> StoreResult<Option<Coin>> {
        Ok(self.coins.read().get(outpoint).cloned())
    }

    fn best_block(&self) -> StoreResult<H256> {
        Ok(*self.best_block.read())
    }
}

/// Pending pool over a vector.
#[derive(Debug, Default)]
pub struct MemoryPool {
    entries: RwLock<Vec<PoolEntry>>,
    updates: AtomicU64,
    clears: AtomicUsize,
}

impl MemoryPool {
    /// Add a transaction with no deltas.
    pub fn add(&self, tx: Transaction) {
        self.add_entry(PoolEntry::new(tx));
    }

    /// Add an entry.
    pub fn add_entry(&self, entry: PoolEntry) {
        self.entries.write().push(entry);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove transactions confirmed by `block`.
    pub fn remove_confirmed(&self, block: &Block) {
        let confirmed: HashSet<H256> = block.transactions.iter().map(Transaction::txid).collect();
        self.entries
            .write()
            .retain(|entry| !confirmed.contains(&entry.txid));
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How often speculative state was cleared.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::Relaxed)
    }
}

impl PendingPool for MemoryPool {
    fn snapshot(&self) -> Vec<PoolEntry> {
        self.entries.read().clone()
    }

    fn transactions_updated(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    fn clear_speculative_state(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }
}

/// Chain whose tip is set by the test or extended by submitted blocks.
#[derive(Debug, Default)]
pub struct MockChain {
    tip: RwLock<Option<ChainTip>>,
}

impl MockChain {
    /// Chain at `tip`.
    pub fn new(tip: ChainTip) -> Self {
        Self {
            tip: RwLock::new(Some(tip)),
        }
    }

    /// Replace the tip.
    pub fn set_tip(&self, tip: Option<ChainTip>) {
        *self.tip.write() = tip;
    }

    /// Make `block` the new tip.
    pub fn connect(&self, block: &Block) {
        let mut guard = self.tip.write();
        let parent = guard.as_ref().map(ChainTip::summary);
        let height = guard.as_ref().map_or(0, |tip| tip.height + 1);
        let median_time_past = guard
            .as_ref()
            .map_or(i64::from(block.header.time), |tip| i64::from(tip.time));
        *guard = Some(ChainTip {
            hash: block.hash(),
            height,
            time: block.header.time,
            bits: block.header.bits,
            median_time_past,
            accumulator_checkpoint: block.header.accumulator_checkpoint,
            parent,
        });
    }
}

impl ChainView for MockChain {
    fn tip(&self) -> Option<ChainTip> {
        self.tip.read().clone()
    }
}

/// Clock frozen at a settable instant.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
    offset: AtomicI64,
}

impl FixedClock {
    /// Clock at `now`.
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
            offset: AtomicI64::new(0),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }

    /// Peer offset applied to the adjusted time.
    pub fn set_offset(&self, offset: i64) {
        self.offset.store(offset, Ordering::Relaxed);
    }
}

impl TimeSource for FixedClock {
    fn adjusted_time(&self) -> i64 {
        self.now() + self.offset.load(Ordering::Relaxed)
    }

    fn now(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}

/// Validator with fixed answers.
///
/// Block validity additionally requires a consistent merkle root and a header on top of the parent.
#[derive(Debug)]
pub struct StaticValidator {
    accept_inputs: bool,
    block_error: Mutex<Option<String>>,
    block_checks: AtomicUsize,
}

impl StaticValidator {
    /// Accept every transaction and every consistent block.
    pub fn accepting() -> Self {
        Self {
            accept_inputs: true,
            block_error: Mutex::new(None),
            block_checks: AtomicUsize::new(0),
        }
    }

    /// Fail every input check.
    pub fn rejecting_inputs() -> Self {
        Self {
            accept_inputs: false,
            ..Self::accepting()
        }
    }

    /// Fail every block with `reason`.
    pub fn rejecting_blocks(reason: &str) -> Self {
        let validator = Self::accepting();
        *validator.block_error.lock() = Some(reason.to_string());
        validator
    }

    /// Number of block validity checks performed.
    pub fn block_checks(&self) -> usize {
        self.block_checks.load(Ordering::Relaxed)
    }
}

impl BlockValidator for StaticValidator {
    fn check_inputs(&self, _tx: &Transaction, _view: &CoinViewCache<'_>, _height: u32) -> bool {
        self.accept_inputs
    }

    fn test_block_validity(&self, block: &Block, parent: &ChainTip) -> std::result::Result<(), String> {
        self.block_checks.fetch_add(1, Ordering::Relaxed);
        if let Some(reason) = self.block_error.lock().clone() {
            return Err(reason);
        }
        if block.header.prev_block != parent.hash {
            return Err("bad-prevblk".into());
        }
        if block.header.merkle_root != block.compute_merkle_root() {
            return Err("bad-txnmrklroot".into());
        }
        Ok(())
    }
}

/// Shielded-spend oracle over in-memory sets.
#[derive(Debug, Default)]
pub struct StaticShieldedOracle {
    spent: RwLock<HashSet<SerialNumber>>,
    invalid: RwLock<HashSet<SerialNumber>>,
    in_chain: RwLock<HashSet<H256>>,
    maintenance: AtomicBool,
}

impl StaticShieldedOracle {
    /// Mark `serial` as spent on chain.
    pub fn mark_spent(&self, serial: SerialNumber) {
        self.spent.write().insert(serial);
    }

    /// Mark `serial` as carrying an invalid proof.
    pub fn mark_invalid(&self, serial: SerialNumber) {
        self.invalid.write().insert(serial);
    }

    /// Mark `txid` as confirmed.
    pub fn mark_in_chain(&self, txid: H256) {
        self.in_chain.write().insert(txid);
    }

    /// Switch maintenance mode.
    pub fn set_maintenance(&self, on: bool) {
        self.maintenance.store(on, Ordering::Relaxed);
    }
}

impl ShieldedSpendOracle for StaticShieldedOracle {
    fn has_valid_serial(&self, spend: &ShieldedSpend) -> bool {
        !self.invalid.read().contains(&spend.serial)
    }

    fn is_serial_spent(&self, serial: &SerialNumber) -> bool {
        self.spent.read().contains(serial)
    }

    fn is_transaction_in_chain(&self, txid: &H256) -> bool {
        self.in_chain.read().contains(txid)
    }

    fn maintenance_mode(&self, _now: i64) -> bool {
        self.maintenance.load(Ordering::Relaxed)
    }
}

/// Checkpoint calculator with a fixed answer.
#[derive(Debug)]
pub struct StaticCheckpoints {
    result: Mutex<std::result::Result<H256, String>>,
}

impl StaticCheckpoints {
    /// Always return `checkpoint`.
    pub fn returning(checkpoint: H256) -> Self {
        Self {
            result: Mutex::new(Ok(checkpoint)),
        }
    }

    /// Always fail.
    pub fn failing(reason: &str) -> Self {
        Self {
            result: Mutex::new(Err(reason.to_string())),
        }
    }
}

impl AccumulatorCheckpoints for StaticCheckpoints {
    fn calculate(&self, _height: u32) -> std::result::Result<H256, String> {
        self.result.lock().clone()
    }
}

/// Peer status with settable values.
#[derive(Debug)]
pub struct StaticPeers {
    count: AtomicUsize,
    synced: AtomicBool,
}

impl StaticPeers {
    /// `count` peers, synced.
    pub fn new(count: usize) -> Self {
        Self {
            count: AtomicUsize::new(count),
            synced: AtomicBool::new(true),
        }
    }

    /// Change the peer count.
    pub fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::Relaxed);
    }

    /// Change the sync state.
    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Relaxed);
    }
}

impl PeerStatus for StaticPeers {
    fn peer_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Relaxed)
    }
}

/// Staking wallet holding one stakeable coin.
#[derive(Debug)]
pub struct MockStakeWallet {
    stake: OutPoint,
    credit: Amount,
    payout: Vec<u8>,
    eligible: AtomicBool,
    finish_ok: AtomicBool,
    locked: AtomicBool,
    balance: AtomicI64,
    mintable: AtomicBool,
    searches: AtomicUsize,
    mintable_checks: AtomicUsize,
}

impl MockStakeWallet {
    /// Wallet staking `credit` held at `stake`.
    pub fn new(stake: OutPoint, credit: Amount) -> Self {
        Self {
            stake,
            credit,
            payout: p2pkh(9),
            eligible: AtomicBool::new(true),
            finish_ok: AtomicBool::new(true),
            locked: AtomicBool::new(false),
            balance: AtomicI64::new(credit),
            mintable: AtomicBool::new(true),
            searches: AtomicUsize::new(0),
            mintable_checks: AtomicUsize::new(0),
        }
    }

    /// Whether kernel searches succeed.
    pub fn set_eligible(&self, eligible: bool) {
        self.eligible.store(eligible, Ordering::Relaxed);
    }

    /// Whether finishing the coinstake succeeds.
    pub fn set_finish_ok(&self, ok: bool) {
        self.finish_ok.store(ok, Ordering::Relaxed);
    }

    /// Lock or unlock.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Relaxed);
    }

    /// Kernel searches performed.
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }

    /// Mintable-coin checks performed.
    pub fn mintable_checks(&self) -> usize {
        self.mintable_checks.load(Ordering::Relaxed)
    }
}

impl StakeWallet for MockStakeWallet {
    fn create_coinstake(&self, _bits: u32, search_time: i64) -> Option<Coinstake> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        if !self.eligible.load(Ordering::Relaxed) {
            return None;
        }
        let tx = Transaction::new(
            vec![TxIn::spend(self.stake, vec![])],
            vec![TxOut::empty(), TxOut::new(self.credit, self.payout.clone())],
        );
        Some(Coinstake {
            tx,
            credit: self.credit,
            time: search_time.clamp(0, i64::from(u32::MAX)) as u32,
        })
    }

    fn finish_coinstake(&self, mut tx: Transaction, reward: Amount) -> Option<Transaction> {
        if !self.finish_ok.load(Ordering::Relaxed) {
            return None;
        }
        let output = tx.outputs.get_mut(1)?;
        output.value = reward;
        Some(tx)
    }

    fn sign_block(&self, block: &mut Block) -> bool {
        block.signature = block.hash().as_bytes().to_vec();
        true
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    fn balance(&self) -> Amount {
        self.balance.load(Ordering::Relaxed)
    }

    fn has_mintable_coins(&self) -> bool {
        self.mintable_checks.fetch_add(1, Ordering::Relaxed);
        self.mintable.load(Ordering::Relaxed)
    }
}

/// Submitter that records blocks and optionally connects them.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    blocks: Mutex<Vec<Block>>,
    reject: AtomicBool,
    chain: Option<Arc<MockChain>>,
    pool: Option<Arc<MemoryPool>>,
}

impl RecordingSubmitter {
    /// Accept and connect blocks to `chain`, removing their transactions from `pool`.
    pub fn connected(chain: Arc<MockChain>, pool: Arc<MemoryPool>) -> Self {
        Self {
            chain: Some(chain),
            pool: Some(pool),
            ..Self::default()
        }
    }

    /// Reject every block.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::Relaxed);
    }

    /// Blocks received so far.
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.lock().clone()
    }
}

#[async_trait]
impl BlockSubmitter for RecordingSubmitter {
    async fn submit_block(&self, block: Block) -> Result<bool> {
        if self.reject.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if let Some(chain) = &self.chain {
            chain.connect(&block);
        }
        if let Some(pool) = &self.pool {
            pool.remove_confirmed(&block);
        }
        self.blocks.lock().push(block);
        Ok(true)
    }
}
