//! Inbound ports (driving side - API)

use crate::domain::BlockTemplate;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Primary port: block production
#[async_trait]
pub trait MiningService: Send + Sync {
    /// Build a template on the current tip; `Ok(None)` if there is nothing to build on
    async fn create_template(
        &self,
        payout_script: Vec<u8>,
        proof_of_stake: bool,
    ) -> Result<Option<BlockTemplate>>;

    /// Start `threads` workers hashing (or staking)
    async fn start_mining(&self, threads: usize, proof_of_stake: bool) -> Result<()>;

    /// Stop all workers and wait for them to exit
    async fn stop_mining(&self) -> Result<()>;

    /// Current status
    async fn status(&self) -> MiningStatus;
}

/// Mining status snapshot
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MiningStatus {
    /// Whether workers are running
    pub active: bool,

    /// Worker count
    pub threads: usize,

    /// Staking instead of hashing
    pub proof_of_stake: bool,

    /// Blocks found since start
    pub blocks_found: u64,

    /// Blocks accepted by the node
    pub blocks_submitted: u64,

    /// Hashes per second
    pub hash_rate: f64,
}
