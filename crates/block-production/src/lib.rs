//! # Block Production
//!
//! Template assembly and the hybrid PoW/PoS mining driver.
//!
//! ## Purpose
//!
//! Builds candidate blocks on top of the active tip:
//! - Candidate selection from the pending pool by priority or fee rate,
//!   resolving in-pool dependencies through an orphan arena
//! - Coinbase (PoW) or coinbase + coinstake (PoS) layout
//! - Header fields: version, time, difficulty bits, nonce seed and the
//!   accumulator checkpoint
//! - Worker pool that hashes nonces or polls stake eligibility and hands
//!   found blocks to the node
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Driver                                             │
//! │  - MiningDriver: PoW search / PoS staking workers   │
//! │  - BlockAssembler: template orchestration           │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports                                              │
//! │  - Inbound: MiningService                           │
//! │  - Outbound: PendingPool, ChainView, StakeWallet... │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (pure logic)                                │
//! │  - CandidateSelector                                │
//! │  - Coinbase / extra nonce / header time             │
//! │  - Template invariants                              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Template Invariants
//!
//! 1. **Layout**: coinbase first; PoS blocks carry the coinstake second
//! 2. **Budgets**: size and sigops stay below the block limits
//! 3. **No double spends**: every prevout and shielded serial appears once
//! 4. **Dependencies**: a transaction follows every in-block parent
//!
//! ## Module Structure
//!
//! - [`domain`]: selection, coinbase helpers, invariants
//! - [`ports`]: inbound/outbound interfaces
//! - [`assembler`]: [`BlockAssembler`]
//! - [`miner`]: [`MiningDriver`]
//! - [`config`], [`error`], [`metrics`], [`telemetry`]
//! - `test_utils`: in-memory ports for tests (feature `test-utils`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod miner;
pub mod ports;
pub mod telemetry;

/// In-memory port implementations for tests.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use assembler::{AssemblerPorts, BlockAssembler};
pub use config::{AssemblerConfig, BlockProductionConfig, LoggingConfig, MinerConfig};
pub use domain::{
    AssemblyStats, BlockTemplate, CandidateSelector, ChainTip, Coinstake, PoolEntry, Selection,
    SelectionOrder, SelectionPolicy,
};
pub use error::{BlockProductionError, Result};
pub use metrics::{HashMeter, MinerMetrics};
pub use miner::{MiningDriver, WorkerState};
pub use ports::inbound::{MiningService, MiningStatus};
pub use ports::outbound::{
    AccumulatorCheckpoints, BlockSubmitter, BlockValidator, ChainView, PeerStatus, PendingPool,
    ShieldedSpendOracle, StakeWallet, SystemTimeSource, TimeSource,
};
pub use telemetry::init_tracing;
