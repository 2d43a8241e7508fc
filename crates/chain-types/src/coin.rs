//! Unspent output entries.

use crate::amount::Amount;
use crate::transaction::{Transaction, TxOut};
use serde::{Deserialize, Serialize};

/// An unspent transaction output together with its origin metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// The output itself.
    pub output: TxOut,
    /// Height of the block that created it.
    pub height: u32,
    /// Created by a coinbase transaction.
    pub is_coinbase: bool,
    /// Created by a coinstake transaction.
    pub is_coinstake: bool,
}

impl Coin {
    /// Coin for a plain output.
    pub fn new(output: TxOut, height: u32) -> Self {
        Self {
            output,
            height,
            is_coinbase: false,
            is_coinstake: false,
        }
    }

    /// Coin for output `index` of `tx`, if that output exists.
    pub fn from_transaction(tx: &Transaction, index: usize, height: u32) -> Option<Self> {
        tx.outputs.get(index).map(|output| Self {
            output: output.clone(),
            height,
            is_coinbase: tx.is_coinbase(),
            is_coinstake: tx.is_coinstake(),
        })
    }

    /// Output value.
    pub fn value(&self) -> Amount {
        self.output.value
    }

    /// Locking script.
    pub fn script_pubkey(&self) -> &[u8] {
        &self.output.script_pubkey
    }

    /// Reward outputs need `maturity` confirmations before they can be spent.
    pub fn is_mature(&self, spend_height: u32, maturity: u32) -> bool {
        if !(self.is_coinbase || self.is_coinstake) {
            return true;
        }
        spend_height.saturating_sub(self.height) >= maturity
    }
}
