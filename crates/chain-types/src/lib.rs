//! # Chain Types
//!
//! Consensus primitives shared by the coin-state and block-production crates.
//!
//! ## Contents
//!
//! - [`transaction`]: inputs, outputs, shielded spends, txid, finality, priority
//! - [`coin`]: unspent output entries keyed by [`OutPoint`]
//! - [`block`]: headers and blocks
//! - [`script`]: sigop counting and push-only script building
//! - [`params`]: per-network consensus constants
//! - [`pow`]: the difficulty oracle (retarget, proof-of-work check, chain work)
//!
//! Everything here is pure: no I/O, no locks, no fallible codecs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod amount;
pub mod block;
pub mod coin;
pub mod encoding;
pub mod hashing;
pub mod params;
pub mod pow;
pub mod script;
pub mod transaction;

pub use amount::{money_range, Amount, FeeRate, CENT, COIN};
pub use block::{Block, BlockHeader, CHECKPOINT_HEADER_VERSION};
pub use coin::Coin;
pub use hashing::{hash256, hash_to_u256, merkle_root, short_hex, u256_to_hash};
pub use params::{ChainParams, Network, ParamsError, ProofOfWorkCheck};
pub use pow::{decode_compact, encode_compact, BlockSummary, CompactTarget, DifficultyOracle, RetargetPolicy};
pub use transaction::{OutPoint, SerialNumber, ShieldedSpend, Transaction, TxIn, TxOut};

pub use primitive_types::{H256, U256};
