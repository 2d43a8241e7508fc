//! Core domain entities for block production

use chain_types::{Amount, Block, BlockSummary, Transaction};
use primitive_types::H256;
use serde::{Deserialize, Serialize};

/// A transaction as handed over by the pending pool.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    /// The transaction
    pub tx: Transaction,

    /// Cached transaction id
    pub txid: H256,

    /// Operator adjustment added to the computed priority
    pub priority_delta: f64,

    /// Operator adjustment added to the input total before the fee rate is taken
    pub fee_delta: Amount,

    /// Time the pool accepted the transaction
    pub time: i64,
}

impl PoolEntry {
    /// Entry with no operator adjustments.
    pub fn new(tx: Transaction) -> Self {
        let txid = tx.txid();
        Self {
            tx,
            txid,
            priority_delta: 0.0,
            fee_delta: 0,
            time: 0,
        }
    }

    /// Set the priority and fee adjustments.
    pub fn with_deltas(mut self, priority_delta: f64, fee_delta: Amount) -> Self {
        self.priority_delta = priority_delta;
        self.fee_delta = fee_delta;
        self
    }
}

/// Ordering of the ready-transaction heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrder {
    /// Fee rate, then priority.
    #[default]
    FeeRateFirst,
    /// Priority, then fee rate.
    PriorityFirst,
}

/// Snapshot of the active chain tip.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainTip {
    /// Tip block hash
    pub hash: H256,

    /// Tip height
    pub height: u32,

    /// Tip block time
    pub time: u32,

    /// Tip compact target
    pub bits: u32,

    /// Median time of the last eleven blocks
    pub median_time_past: i64,

    /// Accumulator checkpoint committed by the tip
    pub accumulator_checkpoint: H256,

    /// The tip's parent, absent at genesis
    pub parent: Option<BlockSummary>,
}

impl ChainTip {
    /// Retarget summary of the tip.
    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            height: self.height,
            time: self.time,
            bits: self.bits,
        }
    }
}

/// Totals of one assembly pass (coinbase and coinstake excluded).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    /// Selected pool transactions
    pub tx_count: usize,

    /// Accounted block size including the header reserve
    pub block_size: usize,

    /// Sum of selected fees
    pub total_fees: Amount,

    /// Accounted sigops including the coinbase reserve
    pub sigops: u32,
}

/// Candidate block ready for hashing or signing.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    /// The block
    pub block: Block,

    /// Fee of each transaction; slot 0 holds the negated total
    pub tx_fees: Vec<Amount>,

    /// Legacy plus P2SH sigops of each transaction
    pub tx_sigops: Vec<u32>,

    /// Height the block would occupy
    pub height: u32,

    /// Selection totals
    pub stats: AssemblyStats,

    /// Whether slot 1 carries a coinstake
    pub proof_of_stake: bool,
}

impl BlockTemplate {
    /// Hash of the parent block.
    pub fn prev_hash(&self) -> H256 {
        self.block.header.prev_block
    }

    /// Total fees collected by the block.
    pub fn total_fees(&self) -> Amount {
        self.stats.total_fees
    }
}

/// Coinstake produced by the staking wallet.
#[derive(Clone, Debug)]
pub struct Coinstake {
    /// The unsigned coinstake transaction
    pub tx: Transaction,

    /// Value of the stake inputs
    pub credit: Amount,

    /// Time the kernel was found; becomes the block time
    pub time: u32,
}
