//! Configuration types for block production

use crate::domain::SelectionOrder;
use crate::error::{BlockProductionError, Result};
use chain_types::Amount;
use serde::Deserialize;

/// Default largest block the assembler will build
pub const DEFAULT_BLOCK_MAX_SIZE: usize = 750_000;

/// Default space reserved for high-priority transactions
pub const DEFAULT_BLOCK_PRIORITY_SIZE: usize = 50_000;

/// Default minimum relay fee, per 1000 bytes
pub const DEFAULT_MIN_RELAY_FEE_PER_KB: Amount = 10_000;

/// Runtime configuration for block production
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlockProductionConfig {
    /// Template assembly settings
    pub assembler: AssemblerConfig,

    /// Mining driver settings
    pub miner: MinerConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

impl BlockProductionConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BlockProductionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no network could use.
    pub fn validate(&self) -> Result<()> {
        if self.assembler.block_max_size == 0 {
            return Err(BlockProductionError::InvalidConfig(
                "assembler.block_max_size must be positive".into(),
            ));
        }
        if self.assembler.min_relay_fee_per_kb < 0 {
            return Err(BlockProductionError::InvalidConfig(
                "assembler.min_relay_fee_per_kb must not be negative".into(),
            ));
        }
        if self.miner.reserve_balance < 0 {
            return Err(BlockProductionError::InvalidConfig(
                "miner.reserve_balance must not be negative".into(),
            ));
        }
        if self.miner.poll_interval_ms == 0 || self.miner.stake_window_poll_ms == 0 {
            return Err(BlockProductionError::InvalidConfig(
                "miner poll intervals must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Template assembly configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Largest block to build (clamped to the network limit minus 1000)
    pub block_max_size: usize,

    /// Space dedicated to high-priority transactions regardless of fee
    pub block_priority_size: usize,

    /// Heap ordering of ready transactions
    pub selection_order: SelectionOrder,

    /// Minimum fee rate for inclusion, per 1000 bytes
    pub min_relay_fee_per_kb: Amount,

    /// Treat a pool transaction with an unresolvable input as an error instead of skipping it
    pub strict_pool_checks: bool,

    /// Log priority and fee rate of every included transaction
    pub print_priority: bool,

    /// Header version override (honoured on on-demand networks only)
    pub block_version_override: Option<i32>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            block_max_size: DEFAULT_BLOCK_MAX_SIZE,
            block_priority_size: DEFAULT_BLOCK_PRIORITY_SIZE,
            selection_order: SelectionOrder::default(),
            min_relay_fee_per_kb: DEFAULT_MIN_RELAY_FEE_PER_KB,
            strict_pool_checks: false,
            print_priority: false,
            block_version_override: None,
        }
    }
}

/// Mining driver configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Worker count (default: num_cpus)
    pub threads: usize,

    /// Stake instead of hashing
    pub proof_of_stake: bool,

    /// Balance kept out of staking
    pub reserve_balance: Amount,

    /// Sleep between stake eligibility checks
    pub poll_interval_ms: u64,

    /// Sleep while waiting for the next stake search window
    pub stake_window_poll_ms: u64,

    /// Rebuild a PoW template after this long once the pool has changed
    pub stale_template_secs: u64,

    /// Minimum spacing of hash-rate log lines
    pub hashrate_log_interval_secs: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            proof_of_stake: false,
            reserve_balance: 0,
            poll_interval_ms: 5_000,
            stake_window_poll_ms: 1_000,
            stale_template_secs: 60,
            hashrate_log_interval_secs: 30 * 60,
        }
    }
}

/// Log output configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,

    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BlockProductionConfig::default();
        assert_eq!(config.assembler.block_max_size, DEFAULT_BLOCK_MAX_SIZE);
        assert_eq!(config.assembler.selection_order, SelectionOrder::FeeRateFirst);
        assert_eq!(config.assembler.min_relay_fee_per_kb, 10_000);
        assert!(!config.assembler.strict_pool_checks);
        assert_eq!(config.miner.threads, num_cpus::get());
        assert_eq!(config.miner.stale_template_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BlockProductionConfig::from_json_str(
            r#"{
                "assembler": { "selection_order": "priority_first", "block_max_size": 250000 },
                "miner": { "threads": 2, "proof_of_stake": true },
                "logging": { "json": true }
            }"#,
        )
        .unwrap();

        assert_eq!(config.assembler.selection_order, SelectionOrder::PriorityFirst);
        assert_eq!(config.assembler.block_max_size, 250_000);
        assert_eq!(config.assembler.block_priority_size, DEFAULT_BLOCK_PRIORITY_SIZE);
        assert_eq!(config.miner.threads, 2);
        assert!(config.miner.proof_of_stake);
        assert_eq!(config.miner.poll_interval_ms, 5_000);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = BlockProductionConfig::from_json_str(r#"{"assembler": {"block_max_size": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, BlockProductionError::InvalidConfig(_)));

        let err = BlockProductionConfig::from_json_str(r#"{"miner": {"reserve_balance": -1}}"#)
            .unwrap_err();
        assert!(matches!(err, BlockProductionError::InvalidConfig(_)));

        assert!(BlockProductionConfig::from_json_str("not json").is_err());
    }
}
