//! Error types for the coin-state crate.

use chain_types::OutPoint;
use primitive_types::H256;
use thiserror::Error;

/// Key-value store failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying database I/O failed.
    #[error("Storage I/O error: {message}")]
    Io {
        /// Backend message
        message: String,
    },

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Codec message
        message: String,
    },

    /// A stored record is malformed.
    #[error("Corrupted record at key {key}")]
    Corrupted {
        /// Hex-encoded key
        key: String,
    },

    /// A backend lock was poisoned by a panicking writer.
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Coin overlay failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoinViewError {
    /// An input that was checked present is missing when applied.
    #[error("Missing input coin {outpoint}")]
    MissingInput {
        /// Spent output
        outpoint: OutPoint,
    },

    /// Read-through to the base store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Block-index load failures. All of them abort startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlockIndexError {
    /// Storage failure while streaming the index.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An index record could not be decoded.
    #[error("Undecodable block index record {hash:?}")]
    Decode {
        /// Hash taken from the record key
        hash: H256,
    },

    /// The stored hash is not the hash of the stored header.
    #[error("Block index record {stored:?} hashes to {computed:?}")]
    HashMismatch {
        /// Hash recorded in the index entry
        stored: H256,
        /// Hash of the header rebuilt from the entry
        computed: H256,
    },

    /// A proof-of-work block does not meet its own target.
    #[error("Proof of work failed for block {hash:?} at height {height}")]
    ProofOfWork {
        /// Block hash
        hash: H256,
        /// Block height
        height: u32,
    },

    /// The accumulator values referenced by a block are not stored.
    #[error("Missing accumulator snapshot for checkpoint {checkpoint:?}")]
    MissingAccumulatorSnapshot {
        /// Checkpoint hash
        checkpoint: H256,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
