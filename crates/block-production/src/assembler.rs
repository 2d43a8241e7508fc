//! # Block Assembler
//!
//! Builds a [`BlockTemplate`] on the current tip.
//!
//! ## Flow
//!
//! ```text
//! chain lock ─► tip, height, version, bits
//!            ─► coinbase (+ coinstake for PoS)
//!            ─► tip unchanged?
//!            ─► CandidateSelector over a fresh CoinViewCache
//!            ─► reward, header, checkpoint
//! unlock     ─► invariants ─► height re-check ─► BlockValidator
//! ```
//!
//! "No work right now" (no tip, stake ineligible, chain moved) is `Ok(None)`.
//! A template the validator rejects is [`BlockProductionError::TemplateInvalid`].

use crate::config::AssemblerConfig;
use crate::domain::selector::BLOCK_SIZE_RESERVE;
use crate::domain::{
    build_coinbase, check_template, update_time, BlockTemplate, CandidateSelector, ChainTip,
    SelectionPolicy,
};
use crate::error::{BlockProductionError, Result};
use crate::ports::outbound::{
    AccumulatorCheckpoints, BlockValidator, ChainView, PendingPool, ShieldedSpendOracle,
    StakeWallet, TimeSource,
};
use chain_types::{short_hex, Block, BlockHeader, ChainParams, DifficultyOracle};
use coin_state::{CoinSource, CoinViewCache};
use parking_lot::Mutex;
use primitive_types::H256;
use rand::Rng;
use std::sync::Arc;

/// Header version before shielded coins activate.
pub const LEGACY_BLOCK_VERSION: i32 = 3;

/// Header version once shielded coins are active.
pub const ZEROCOIN_BLOCK_VERSION: i32 = 4;

/// Collaborators of the assembler.
#[derive(Clone)]
pub struct AssemblerPorts {
    /// Active chain
    pub chain: Arc<dyn ChainView>,
    /// Pending pool
    pub pool: Arc<dyn PendingPool>,
    /// Committed coins
    pub coins: Arc<dyn CoinSource>,
    /// Clocks
    pub time: Arc<dyn TimeSource>,
    /// Consensus checks
    pub validator: Arc<dyn BlockValidator>,
    /// Shielded-coin state
    pub shielded: Arc<dyn ShieldedSpendOracle>,
    /// Accumulator checkpoints
    pub checkpoints: Arc<dyn AccumulatorCheckpoints>,
    /// Staking wallet, required for proof-of-stake templates
    pub wallet: Option<Arc<dyn StakeWallet>>,
}

/// Template builder for both proof-of-work and proof-of-stake blocks.
pub struct BlockAssembler {
    params: Arc<ChainParams>,
    config: AssemblerConfig,
    oracle: DifficultyOracle,
    chain_lock: Arc<Mutex<()>>,
    ports: AssemblerPorts,
}

impl BlockAssembler {
    /// Assembler sharing `chain_lock` with the rest of the node.
    pub fn new(
        params: Arc<ChainParams>,
        config: AssemblerConfig,
        ports: AssemblerPorts,
        chain_lock: Arc<Mutex<()>>,
    ) -> Self {
        let oracle = DifficultyOracle::for_params(&params);
        Self {
            params,
            config,
            oracle,
            chain_lock,
            ports,
        }
    }

    /// Network parameters.
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Collaborators.
    pub fn ports(&self) -> &AssemblerPorts {
        &self.ports
    }

    /// Difficulty oracle for this network.
    pub fn oracle(&self) -> &DifficultyOracle {
        &self.oracle
    }

    /// Header version for a block assembled at `adjusted_time`.
    pub fn block_version(&self, adjusted_time: i64) -> i32 {
        if self.params.mine_blocks_on_demand {
            if let Some(version) = self.config.block_version_override {
                return version;
            }
        }
        if self.params.is_zerocoin_active_at(adjusted_time) {
            ZEROCOIN_BLOCK_VERSION
        } else {
            LEGACY_BLOCK_VERSION
        }
    }

    /// Configured block size clamped to `[1000, max_block_size - 1000]`.
    pub fn max_block_size(&self) -> usize {
        self.config
            .block_max_size
            .min(self.params.max_block_size.saturating_sub(BLOCK_SIZE_RESERVE))
            .max(BLOCK_SIZE_RESERVE)
    }

    /// Build a template paying `payout_script` (proof-of-work) or staking (proof-of-stake).
    #[tracing::instrument(skip(self, payout_script), fields(network = ?self.params.network))]
    pub fn create_new_block(
        &self,
        payout_script: &[u8],
        proof_of_stake: bool,
    ) -> Result<Option<BlockTemplate>> {
        let guard = self.chain_lock.lock();

        let Some(tip) = self.ports.chain.tip() else {
            tracing::debug!("[assembler] no chain tip yet");
            return Ok(None);
        };
        let height = tip.height + 1;
        let adjusted_time = self.ports.time.adjusted_time();
        let zerocoin_active = self.params.is_zerocoin_active_at(adjusted_time);

        let bits = self
            .oracle
            .next_work_required(Some(&tip.summary()), tip.parent.as_ref());
        let mut block = Block::new(BlockHeader {
            version: self.block_version(adjusted_time),
            prev_block: tip.hash,
            bits,
            ..BlockHeader::default()
        });

        let coinstake = if proof_of_stake {
            let Some(wallet) = self.ports.wallet.as_ref() else {
                tracing::warn!("[assembler] proof-of-stake requested without a staking wallet");
                return Ok(None);
            };
            let Some(stake) = wallet.create_coinstake(bits, adjusted_time) else {
                tracing::debug!("[assembler] no stake kernel at height {}", height);
                return Ok(None);
            };
            block.header.time = stake.time;
            block.transactions.push(build_coinbase(height, Vec::new(), 0));
            Some((stake, wallet))
        } else {
            block
                .transactions
                .push(build_coinbase(height, payout_script.to_vec(), 0));
            None
        };

        if self.ports.chain.tip().map(|current| current.hash) != Some(tip.hash) {
            tracing::info!("[assembler] chain changed meanwhile, abandoning template");
            return Ok(None);
        }

        let max_block_size = self.max_block_size();
        let policy = SelectionPolicy {
            max_block_size,
            priority_size: self.config.block_priority_size.min(max_block_size),
            max_block_sigops: self.params.max_block_sigops,
            min_relay_fee: SelectionPolicy::relay_floor(self.config.min_relay_fee_per_kb),
            order: self.config.selection_order,
            maintenance_mode: self.ports.shielded.maintenance_mode(adjusted_time),
            strict_pool_checks: self.config.strict_pool_checks,
            print_priority: self.config.print_priority,
        };
        let mut view = CoinViewCache::new(self.ports.coins.as_ref());
        if let Some((stake, _)) = &coinstake {
            if view.have_inputs(&stake.tx)? {
                view.apply_transaction(&stake.tx, height)?;
            } else {
                tracing::warn!("[assembler] coinstake inputs not found in coin view");
            }
        }

        let selector = CandidateSelector::new(
            policy,
            self.ports.shielded.as_ref(),
            self.ports.validator.as_ref(),
        );
        let selection = selector.select(self.ports.pool.snapshot(), &mut view, height, adjusted_time)?;
        let fees = selection.stats.total_fees;

        let mut tx_fees = vec![-fees];
        let mut tx_sigops = vec![0u32];

        match coinstake {
            None => {
                block.transactions[0].outputs[0].value = self.params.block_subsidy(height) + fees;
            }
            Some((stake, wallet)) => {
                let sigops = stake.tx.legacy_sigop_count();
                let Some(finished) = wallet.finish_coinstake(stake.tx, stake.credit + fees) else {
                    tracing::warn!("[assembler] failed to finish coinstake at height {}", height);
                    self.ports.pool.clear_speculative_state();
                    return Ok(None);
                };
                tracing::debug!("[assembler] coinstake finished, reward {}", stake.credit + fees);
                block.transactions.push(finished);
                tx_fees.push(0);
                tx_sigops.push(sigops);
            }
        }

        block.transactions.extend(selection.transactions);
        tx_fees.extend(selection.fees);
        tx_sigops.extend(selection.sigops);

        if !proof_of_stake {
            update_time(&mut block, &tip, adjusted_time);
        }
        block.header.nonce = rand::thread_rng().gen_range(0..1_000_000_000u32) + 100;
        block.header.accumulator_checkpoint = if zerocoin_active {
            self.accumulator_checkpoint(height, &tip)
        } else {
            H256::zero()
        };
        tx_sigops[0] = block.transactions[0].legacy_sigop_count();
        block.header.merkle_root = block.compute_merkle_root();

        let template = BlockTemplate {
            block,
            tx_fees,
            tx_sigops,
            height,
            stats: selection.stats,
            proof_of_stake,
        };
        drop(guard);

        check_template(&template, max_block_size, self.params.max_block_sigops)?;

        if self
            .ports
            .chain
            .height()
            .is_some_and(|current| current >= height)
        {
            tracing::info!("[assembler] height {} taken meanwhile, abandoning template", height);
            self.ports.pool.clear_speculative_state();
            return Ok(None);
        }

        if let Err(reason) = self
            .ports
            .validator
            .test_block_validity(&template.block, &tip)
        {
            tracing::error!(
                "[assembler] template at height {} failed validity check: {}",
                height,
                reason
            );
            self.ports.pool.clear_speculative_state();
            return Err(BlockProductionError::TemplateInvalid { reason });
        }

        tracing::info!(
            "[assembler] template {} at height {}: {} txs, {} bytes, fees {}",
            short_hex(&template.block.hash()),
            height,
            template.stats.tx_count,
            template.stats.block_size,
            fees
        );
        Ok(Some(template))
    }

    /// Checkpoint for a block at `height`, falling back to the parent's.
    fn accumulator_checkpoint(&self, height: u32, tip: &ChainTip) -> H256 {
        if self.ports.shielded.maintenance_mode(self.ports.time.now()) {
            return tip.accumulator_checkpoint;
        }
        match self.ports.checkpoints.calculate(height) {
            Ok(checkpoint) => checkpoint,
            Err(reason) => {
                tracing::warn!(
                    "[assembler] failed to calculate accumulator checkpoint: {}",
                    reason
                );
                tip.accumulator_checkpoint
            }
        }
    }
}
