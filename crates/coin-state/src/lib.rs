//! # Coin State
//!
//! Chain-state application for the hybrid node: the unspent-output overlay
//! used while validating and assembling blocks, and the services that commit
//! its mutations to durable storage.
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters                                           │
//! │  - InMemoryKVStore (tests, ephemeral nodes)         │
//! │  - RocksDbStore (feature "rocksdb")                 │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports                                              │
//! │  - KeyValueStore, BatchOperation                    │
//! │  - CoinSource                                       │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Services                                           │
//! │  - CoinViewCache (overlay, never writes)            │
//! │  - CoinStore (atomic batch commit, stats)           │
//! │  - BlockTreeStore (index records, tree rebuild)     │
//! │  - SecondaryIndexStore (optional indices)           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomicity
//!
//! A commit is a single [`KeyValueStore::atomic_batch_write`]: the coin
//! writes, the coin erasures and the best-block marker land together or not
//! at all.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod block_index;
pub mod coins_db;
pub mod error;
pub mod indices;
pub mod keys;
pub mod ports;
pub mod view;

pub use adapters::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbStore};
pub use block_index::{
    AccumulatorSnapshots, AccumulatorValues, BlockIndex, BlockIndexEntry, BlockTreeStore,
    DiskBlockIndex,
};
pub use coins_db::{BatchWriteSummary, CoinStats, CoinStore};
pub use error::{BlockIndexError, CoinViewError, StoreError, StoreResult};
pub use indices::{IndexFlags, SecondaryIndexStore};
pub use ports::{BatchOperation, CoinSource, KeyValueStore};
pub use view::{CacheEntry, CoinChanges, CoinViewCache};
