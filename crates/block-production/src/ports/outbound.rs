//! Outbound ports (driven side - SPI)
//!
//! Everything the assembler and the mining driver need from the rest of the
//! node. All ports except [`BlockSubmitter`] are synchronous: they are called
//! while the chain lock is held and must not suspend.

use crate::domain::{ChainTip, Coinstake, PoolEntry};
use crate::error::Result;
use async_trait::async_trait;
use chain_types::{Amount, Block, SerialNumber, ShieldedSpend, Transaction};
use coin_state::CoinViewCache;
use primitive_types::H256;
use std::time::{SystemTime, UNIX_EPOCH};

/// Port: pending transaction pool
pub trait PendingPool: Send + Sync {
    /// Every pending transaction with its operator deltas
    fn snapshot(&self) -> Vec<PoolEntry>;

    /// Counter bumped on every pool change
    fn transactions_updated(&self) -> u64;

    /// Drop speculative state left behind by an abandoned template
    fn clear_speculative_state(&self);
}

/// Port: active chain
pub trait ChainView: Send + Sync {
    /// Current tip, `None` before genesis is loaded
    fn tip(&self) -> Option<ChainTip>;

    /// Height of the tip, `None` before genesis is loaded
    fn height(&self) -> Option<u32> {
        self.tip().map(|tip| tip.height)
    }
}

/// Port: clocks
pub trait TimeSource: Send + Sync {
    /// Network-adjusted time in unix seconds
    fn adjusted_time(&self) -> i64;

    /// Local wall-clock time in unix seconds
    fn now(&self) -> i64;
}

/// [`TimeSource`] backed by the system clock with no peer adjustment.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn adjusted_time(&self) -> i64 {
        self.now()
    }

    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Port: consensus validation
pub trait BlockValidator: Send + Sync {
    /// Script and consensus checks of `tx` against `view` at `height`
    fn check_inputs(&self, tx: &Transaction, view: &CoinViewCache<'_>, height: u32) -> bool;

    /// Full contextual validity of `block` on top of `parent`; `Err` carries the reject reason
    fn test_block_validity(&self, block: &Block, parent: &ChainTip) -> std::result::Result<(), String>;
}

/// Port: staking wallet
pub trait StakeWallet: Send + Sync {
    /// Search for a stake kernel at `search_time`; `None` if the wallet is not eligible
    fn create_coinstake(&self, bits: u32, search_time: i64) -> Option<Coinstake>;

    /// Pay `reward` into the coinstake and sign it
    fn finish_coinstake(&self, tx: Transaction, reward: Amount) -> Option<Transaction>;

    /// Sign the block header
    fn sign_block(&self, block: &mut Block) -> bool;

    /// Whether the wallet is locked
    fn is_locked(&self) -> bool;

    /// Spendable balance
    fn balance(&self) -> Amount;

    /// Whether any coin is old enough to stake
    fn has_mintable_coins(&self) -> bool;
}

/// Port: shielded-coin consensus state
pub trait ShieldedSpendOracle: Send + Sync {
    /// Whether the spend proof and serial are well-formed
    fn has_valid_serial(&self, spend: &ShieldedSpend) -> bool;

    /// Whether `serial` is already spent on chain
    fn is_serial_spent(&self, serial: &SerialNumber) -> bool;

    /// Whether `txid` is already confirmed
    fn is_transaction_in_chain(&self, txid: &H256) -> bool;

    /// Whether shielded spends are suspended at `now`
    fn maintenance_mode(&self, now: i64) -> bool;
}

/// Port: accumulator checkpoint calculation
pub trait AccumulatorCheckpoints: Send + Sync {
    /// Checkpoint committed by a block at `height`
    fn calculate(&self, height: u32) -> std::result::Result<H256, String>;
}

/// Port: peer connectivity
pub trait PeerStatus: Send + Sync {
    /// Connected peers
    fn peer_count(&self) -> usize;

    /// Whether initial sync is finished
    fn is_synced(&self) -> bool;
}

/// Port: hand a found block to the node
#[async_trait]
pub trait BlockSubmitter: Send + Sync {
    /// Process `block`; `Ok(true)` if it extended the chain
    async fn submit_block(&self, block: Block) -> Result<bool>;
}
