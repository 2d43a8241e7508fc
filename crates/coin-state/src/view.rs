//! # Coin View Overlay
//!
//! Copy-on-write cache of the unspent-output set layered over a [`CoinSource`].
//!
//! Each touched outpoint carries one of three states:
//!
//! ```text
//! Clean(coin)         read through from the base, unchanged
//! DirtyPresent(coin)  created (or re-created) in this overlay
//! DirtyPruned         spent in this overlay, must be erased from the base
//! ```
//!
//! A `DirtyPresent` coin that the base never held is *fresh*. Spending a fresh
//! coin drops the entry entirely: nothing needs to be written for it.
//!
//! The overlay never writes to its base. Changes leave it only through
//! [`CoinViewCache::into_changes`], which consumes it.

use crate::error::CoinViewError;
use crate::ports::CoinSource;
use chain_types::{Amount, Coin, OutPoint, Transaction, TxIn};
use primitive_types::H256;
use std::collections::HashMap;

/// Per-outpoint overlay state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEntry {
    /// Unmodified copy of a base coin.
    Clean(Coin),
    /// Coin added in this overlay.
    DirtyPresent(Coin),
    /// Coin spent in this overlay.
    DirtyPruned,
}

impl CacheEntry {
    fn coin(&self) -> Option<&Coin> {
        match self {
            CacheEntry::Clean(coin) | CacheEntry::DirtyPresent(coin) => Some(coin),
            CacheEntry::DirtyPruned => None,
        }
    }

    fn is_dirty(&self) -> bool {
        !matches!(self, CacheEntry::Clean(_))
    }
}

/// Mutations drained from an overlay, ready for a batch commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoinChanges {
    /// Coins to store, in outpoint order.
    pub writes: Vec<(OutPoint, Coin)>,
    /// Coins to erase, in outpoint order.
    pub erasures: Vec<OutPoint>,
    /// Best block recorded on the overlay, if any.
    pub best_block: Option<H256>,
}

impl CoinChanges {
    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.erasures.is_empty()
    }
}

/// Mutable coin overlay owned by one assembly or connect operation.
pub struct CoinViewCache<'a> {
    base: &'a dyn CoinSource,
    entries: HashMap<OutPoint, CacheEntry>,
    best_block: Option<H256>,
}

impl<'a> CoinViewCache<'a> {
    /// Empty overlay over `base`.
    pub fn new(base: &'a dyn CoinSource) -> Self {
        Self {
            base,
            entries: HashMap::new(),
            best_block: None,
        }
    }

    /// Coin at `outpoint`, reading through to the base on a miss.
    pub fn access_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinViewError> {
        if let Some(entry) = self.entries.get(outpoint) {
            return Ok(entry.coin().cloned());
        }
        match self.base.coin(outpoint)? {
            Some(coin) => {
                self.entries
                    .insert(*outpoint, CacheEntry::Clean(coin.clone()));
                Ok(Some(coin))
            }
            None => Ok(None),
        }
    }

    /// Cached coin without touching the base.
    pub fn cached_coin(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.entries.get(outpoint).and_then(CacheEntry::coin)
    }

    /// Whether `outpoint` is unspent as seen through the overlay.
    pub fn have_coin(&mut self, outpoint: &OutPoint) -> Result<bool, CoinViewError> {
        Ok(self.access_coin(outpoint)?.is_some())
    }

    /// Whether every conventional input of `tx` is available. Shielded spends are ignored.
    pub fn have_inputs(&mut self, tx: &Transaction) -> Result<bool, CoinViewError> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        for prevout in tx.inputs.iter().filter_map(TxIn::prevout) {
            if !self.have_coin(prevout)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Sum of spent coin values plus shielded denominations.
    pub fn value_in(&mut self, tx: &Transaction) -> Result<Amount, CoinViewError> {
        if tx.is_coinbase() {
            return Ok(0);
        }
        let mut total = tx.shielded_value_in();
        for prevout in tx.inputs.iter().filter_map(TxIn::prevout) {
            let coin = self
                .access_coin(prevout)?
                .ok_or(CoinViewError::MissingInput { outpoint: *prevout })?;
            total = total.saturating_add(coin.value());
        }
        Ok(total)
    }

    /// Add `coin` at `outpoint`.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        self.entries.insert(outpoint, CacheEntry::DirtyPresent(coin));
    }

    /// Spend the coin at `outpoint`, returning it.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Coin, CoinViewError> {
        let coin = self
            .access_coin(outpoint)?
            .ok_or(CoinViewError::MissingInput { outpoint: *outpoint })?;

        let fresh = match self.entries.get(outpoint) {
            Some(CacheEntry::DirtyPresent(_)) => !self.base.has_coin(outpoint)?,
            _ => false,
        };
        if fresh {
            self.entries.remove(outpoint);
        } else {
            self.entries.insert(*outpoint, CacheEntry::DirtyPruned);
        }
        Ok(coin)
    }

    /// Spend the inputs of `tx` and add its non-empty outputs at `height`.
    ///
    /// Inputs must have been checked with [`have_inputs`](Self::have_inputs);
    /// a missing one is reported as [`CoinViewError::MissingInput`].
    pub fn apply_transaction(&mut self, tx: &Transaction, height: u32) -> Result<(), CoinViewError> {
        if !tx.is_coinbase() {
            for prevout in tx.inputs.iter().filter_map(TxIn::prevout) {
                self.spend_coin(prevout)?;
            }
        }

        let txid = tx.txid();
        for (index, output) in tx.outputs.iter().enumerate() {
            if output.is_empty() {
                continue;
            }
            if let Some(coin) = Coin::from_transaction(tx, index, height) {
                self.add_coin(OutPoint::new(txid, index as u32), coin);
            }
        }
        Ok(())
    }

    /// Best block of the overlay, falling back to the base.
    pub fn best_block(&self) -> Result<H256, CoinViewError> {
        match self.best_block {
            Some(hash) => Ok(hash),
            None => Ok(self.base.best_block()?),
        }
    }

    /// Record the block this overlay corresponds to.
    pub fn set_best_block(&mut self, hash: H256) {
        self.best_block = Some(hash);
    }

    /// Entries that will produce a write or erase.
    pub fn dirty_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_dirty()).count()
    }

    /// All cached entries.
    pub fn cached_count(&self) -> usize {
        self.entries.len()
    }

    /// Consume the overlay, yielding its dirty entries.
    pub fn into_changes(self) -> CoinChanges {
        let mut changes = CoinChanges {
            best_block: self.best_block,
            ..CoinChanges::default()
        };
        for (outpoint, entry) in self.entries {
            match entry {
                CacheEntry::Clean(_) => {}
                CacheEntry::DirtyPresent(coin) => changes.writes.push((outpoint, coin)),
                CacheEntry::DirtyPruned => changes.erasures.push(outpoint),
            }
        }
        changes.writes.sort_by(|a, b| a.0.cmp(&b.0));
        changes.erasures.sort();
        changes
    }
}
