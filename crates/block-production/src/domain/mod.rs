//! Domain layer - block production logic
//!
//! Everything here is synchronous: it runs under the chain lock.
//!
//! ## Entities
//!
//! - [`BlockTemplate`]: assembled candidate block with per-transaction fees and sigops
//! - [`PoolEntry`]: pending transaction with operator deltas
//! - [`ChainTip`]: snapshot of the active tip
//! - [`Coinstake`]: staking wallet output
//!
//! ## Services
//!
//! - [`CandidateSelector`]: dependency-aware greedy selection
//! - Coinbase helpers: [`build_coinbase`], [`increment_extra_nonce`], [`update_time`]
//!
//! ## Invariants
//!
//! Checked on every template before release:
//! 1. Coinbase in slot 0, coinstake in slot 1 only for proof-of-stake
//! 2. Accounted size and sigops strictly below budget
//! 3. No outpoint spent twice
//! 4. No shielded serial revealed twice

pub mod coinbase;
mod entities;
pub mod invariants;
pub mod selector;

pub use coinbase::{build_coinbase, coinbase_script_sig, increment_extra_nonce, update_time, ExtraNonce};
pub use entities::*;
pub use invariants::check_template;
pub use selector::{CandidateSelector, Selection, SelectionPolicy};
