//! Per-network consensus parameters.

use crate::amount::{Amount, COIN};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Main,
    /// Public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
    /// In-process unit-test network.
    UnitTest,
}

/// Whether block hashes are checked against their target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofOfWorkCheck {
    /// Normal consensus behaviour.
    Enforce,
    /// Accept every header. Only regtest and unit-test parameters may select this.
    Skip,
}

/// Parameter errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    /// The requested override is not available on this network.
    #[error("{setting} cannot be changed on {network:?}")]
    OverrideNotAllowed {
        /// Network the override was attempted on.
        network: Network,
        /// Name of the setting.
        setting: &'static str,
    },
}

/// Consensus constants for one network.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// Network these parameters belong to.
    pub network: Network,
    /// Easiest permitted target.
    pub pow_limit: U256,
    /// Desired seconds between blocks.
    pub target_spacing: u64,
    /// Lower clamp on the observed block interval during retarget.
    pub min_actual_timespan: u64,
    /// Upper clamp on the observed block interval during retarget.
    pub max_actual_timespan: u64,
    /// Last height issued by proof of work.
    pub last_pow_block: u32,
    /// Height from which shielded coins are enabled.
    pub zerocoin_start_height: u32,
    /// Time from which shielded coins are enabled.
    pub zerocoin_start_time: i64,
    /// Confirmations before reward outputs are spendable.
    pub coinbase_maturity: u32,
    /// Total money supply cap.
    pub max_money: Amount,
    /// Maximum serialized block size.
    pub max_block_size: usize,
    /// Maximum signature operations per block.
    pub max_block_sigops: u32,
    /// Subsidy of the first block.
    pub initial_subsidy: Amount,
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: u32,
    /// Mining waits for at least one peer.
    pub mining_requires_peers: bool,
    /// Blocks may carry the easiest target regardless of retarget.
    pub allow_min_difficulty_blocks: bool,
    /// Blocks are produced on request only.
    pub mine_blocks_on_demand: bool,
    /// Default miner thread count (0 = one per core).
    pub default_miner_threads: usize,
    /// Staking stays idle while the tip is older than this time.
    pub stake_min_tip_time: i64,
    /// Width of the stake search window in seconds.
    pub stake_search_interval: i64,
    /// Allowed drift of a coinstake timestamp into the future.
    pub max_stake_future_drift: i64,
    pow_check: ProofOfWorkCheck,
}

impl ChainParams {
    /// Production network parameters.
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            pow_limit: !U256::zero() >> 1u32,
            target_spacing: 60,
            min_actual_timespan: 30,
            max_actual_timespan: 120,
            last_pow_block: 1390,
            zerocoin_start_height: 1391,
            zerocoin_start_time: 1_519_330_596,
            coinbase_maturity: 100,
            max_money: 21_000_000 * COIN,
            max_block_size: 2_000_000,
            max_block_sigops: 2_000_000 / 50,
            initial_subsidy: 50 * COIN,
            subsidy_halving_interval: 210_000,
            mining_requires_peers: true,
            allow_min_difficulty_blocks: false,
            mine_blocks_on_demand: false,
            default_miner_threads: 0,
            stake_min_tip_time: 1_519_096_403,
            stake_search_interval: 60,
            max_stake_future_drift: 180,
            pow_check: ProofOfWorkCheck::Enforce,
        }
    }

    /// Public test network parameters.
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            last_pow_block: 200,
            coinbase_maturity: 15,
            allow_min_difficulty_blocks: true,
            ..Self::main()
        }
    }

    /// Regression-test parameters: no peers needed, blocks on demand.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            mining_requires_peers: false,
            mine_blocks_on_demand: true,
            default_miner_threads: 1,
            stake_min_tip_time: 0,
            ..Self::testnet()
        }
    }

    /// Unit-test parameters: regtest without min-difficulty relaxation.
    pub fn unit_test() -> Self {
        Self {
            network: Network::UnitTest,
            allow_min_difficulty_blocks: false,
            ..Self::regtest()
        }
    }

    /// Parameters for `network`.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
            Network::UnitTest => Self::unit_test(),
        }
    }

    /// Select proof-of-work checking. `Skip` is refused outside regtest and unit tests.
    pub fn with_proof_of_work_check(mut self, check: ProofOfWorkCheck) -> Result<Self, ParamsError> {
        if check == ProofOfWorkCheck::Skip
            && !matches!(self.network, Network::Regtest | Network::UnitTest)
        {
            return Err(ParamsError::OverrideNotAllowed {
                network: self.network,
                setting: "proof-of-work check",
            });
        }
        self.pow_check = check;
        Ok(self)
    }

    /// Active proof-of-work check mode.
    pub fn proof_of_work_check(&self) -> ProofOfWorkCheck {
        self.pow_check
    }

    /// Subsidy for the block at `height`.
    pub fn block_subsidy(&self, height: u32) -> Amount {
        if self.subsidy_halving_interval == 0 {
            return self.initial_subsidy;
        }
        let halvings = height / self.subsidy_halving_interval;
        if halvings >= 63 {
            return 0;
        }
        self.initial_subsidy >> halvings
    }

    /// Whether shielded coins are active at `time`.
    pub fn is_zerocoin_active_at(&self, time: i64) -> bool {
        time >= self.zerocoin_start_time
    }

    /// Whether `height` is still issued by proof of work.
    pub fn is_pow_height(&self, height: u32) -> bool {
        height <= self.last_pow_block
    }
}
