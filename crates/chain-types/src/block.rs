//! Block headers and blocks.

use crate::encoding::{compact_size_len, write_var_bytes};
use crate::hashing::{hash256, merkle_root};
use crate::transaction::Transaction;
use primitive_types::H256;
use serde::{Deserialize, Serialize};

/// First header version that commits to the accumulator checkpoint.
pub const CHECKPOINT_HEADER_VERSION: i32 = 4;

/// Block header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Header version.
    pub version: i32,
    /// Hash of the parent block.
    pub prev_block: H256,
    /// Merkle root over the transaction ids.
    pub merkle_root: H256,
    /// Block time (unix seconds).
    pub time: u32,
    /// Compact-encoded target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
    /// Shielded-coin accumulator checkpoint (committed from version 4).
    pub accumulator_checkpoint: H256,
}

impl BlockHeader {
    /// Canonical header encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(112);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.prev_block.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        if self.version >= CHECKPOINT_HEADER_VERSION {
            out.extend_from_slice(self.accumulator_checkpoint.as_bytes());
        }
        out
    }

    /// Block hash.
    pub fn hash(&self) -> H256 {
        hash256(&self.encode())
    }
}

/// A full block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Header.
    pub header: BlockHeader,
    /// Transactions; slot 0 is the coinbase, slot 1 the coinstake for PoS blocks.
    pub transactions: Vec<Transaction>,
    /// Staker signature over the header (PoS only).
    pub signature: Vec<u8>,
}

impl Block {
    /// Empty block with the given header.
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            transactions: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Block hash.
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Whether slot 1 holds a coinstake.
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    /// Merkle root over the current transaction list.
    pub fn compute_merkle_root(&self) -> H256 {
        let txids: Vec<H256> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }

    /// Encoded size in bytes.
    pub fn serialized_size(&self) -> usize {
        let mut size = self.header.encode().len();
        size += compact_size_len(self.transactions.len() as u64);
        size += self
            .transactions
            .iter()
            .map(Transaction::serialized_size)
            .sum::<usize>();
        if self.is_proof_of_stake() {
            let mut sig = Vec::new();
            write_var_bytes(&mut sig, &self.signature);
            size += sig.len();
        }
        size
    }
}
