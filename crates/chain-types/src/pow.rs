//! Difficulty oracle.
//!
//! **IMPORTANT**: the proof-of-work "target" is a CEILING:
//! - HIGHER target = EASIER (more hashes fall below it)
//! - LOWER target = HARDER
//!
//! When blocks arrive too fast the retarget LOWERS the target.
//!
//! Targets travel in the 32-bit compact encoding (`bits`): one size byte
//! followed by a 23-bit mantissa and a sign bit.

use crate::hashing::hash_to_u256;
use crate::params::{ChainParams, ProofOfWorkCheck};
use primitive_types::{H256, U256, U512};

/// A decoded compact target with the encoding's error flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactTarget {
    /// Decoded magnitude.
    pub target: U256,
    /// Sign bit set on a non-zero mantissa.
    pub negative: bool,
    /// Magnitude does not fit in 256 bits.
    pub overflow: bool,
}

impl CompactTarget {
    /// Usable as a proof-of-work target: positive, in range, non-zero.
    pub fn is_usable(&self) -> bool {
        !self.negative && !self.overflow && !self.target.is_zero()
    }
}

/// Decode compact `bits`.
pub fn decode_compact(bits: u32) -> CompactTarget {
    let size = (bits >> 24) as usize;
    let word = bits & 0x007f_ffff;

    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
    let negative = word != 0 && (bits & 0x0080_0000) != 0;

    let target = if overflow {
        U256::zero()
    } else if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else {
        U256::from(word) << (8 * (size - 3))
    };

    CompactTarget {
        target,
        negative,
        overflow,
    }
}

/// Encode a target in compact form.
pub fn encode_compact(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3))).low_u64() as u32
    };
    // The sign bit is reserved, so shift the mantissa into the next byte.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | ((size as u32) << 24)
}

/// Summary of a block as needed by the retarget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSummary {
    /// Block height.
    pub height: u32,
    /// Block time.
    pub time: u32,
    /// Compact target of the block.
    pub bits: u32,
}

/// Retarget configuration extracted from [`ChainParams`].
#[derive(Clone, Debug)]
pub struct RetargetPolicy {
    /// Easiest permitted target.
    pub pow_limit: U256,
    /// Desired seconds between blocks.
    pub target_spacing: u64,
    /// Lower clamp on the observed interval.
    pub min_timespan: u64,
    /// Upper clamp on the observed interval.
    pub max_timespan: u64,
    /// Heights up to this value use the fixed ceiling.
    pub last_pow_block: u32,
    /// Proof-of-work check mode.
    pub check: ProofOfWorkCheck,
}

impl From<&ChainParams> for RetargetPolicy {
    fn from(params: &ChainParams) -> Self {
        Self {
            pow_limit: params.pow_limit,
            target_spacing: params.target_spacing,
            min_timespan: params.min_actual_timespan,
            max_timespan: params.max_actual_timespan,
            last_pow_block: params.last_pow_block,
            check: params.proof_of_work_check(),
        }
    }
}

/// Next-target computation and proof-of-work acceptance. Holds no chain state.
#[derive(Clone, Debug)]
pub struct DifficultyOracle {
    policy: RetargetPolicy,
}

impl DifficultyOracle {
    /// Oracle over an explicit policy.
    pub fn new(policy: RetargetPolicy) -> Self {
        Self { policy }
    }

    /// Oracle for a network.
    pub fn for_params(params: &ChainParams) -> Self {
        Self::new(RetargetPolicy::from(params))
    }

    /// The policy in use.
    pub fn policy(&self) -> &RetargetPolicy {
        &self.policy
    }

    /// Compact form of the network ceiling.
    pub fn pow_limit_bits(&self) -> u32 {
        encode_compact(self.policy.pow_limit)
    }

    /// Target for the block after `tip`.
    ///
    /// During the proof-of-work bootstrap phase the ceiling is returned unchanged.
    /// Afterwards the tip's target is rescaled by the clamped tip-to-parent interval.
    pub fn next_work_required(
        &self,
        tip: Option<&BlockSummary>,
        parent: Option<&BlockSummary>,
    ) -> u32 {
        let limit_bits = self.pow_limit_bits();
        let (tip, parent) = match (tip, parent) {
            (Some(tip), Some(parent)) if tip.height > self.policy.last_pow_block => (tip, parent),
            _ => return limit_bits,
        };

        let elapsed = i64::from(tip.time) - i64::from(parent.time);
        let actual = elapsed.clamp(
            self.policy.min_timespan as i64,
            self.policy.max_timespan as i64,
        ) as u64;

        let current = decode_compact(tip.bits).target;
        let scaled = current.full_mul(U256::from(actual)) / U512::from(self.policy.target_spacing.max(1));
        let next = U256::try_from(scaled)
            .map_or(self.policy.pow_limit, |target| target.min(self.policy.pow_limit));

        encode_compact(next)
    }

    /// Whether `hash` satisfies the target encoded in `bits`.
    pub fn check_proof_of_work(&self, hash: &H256, bits: u32) -> bool {
        if self.policy.check == ProofOfWorkCheck::Skip {
            return true;
        }

        let decoded = decode_compact(bits);
        if !decoded.is_usable() || decoded.target > self.policy.pow_limit {
            return false;
        }

        hash_to_u256(hash) <= decoded.target
    }

    /// Expected number of hashes to meet `bits`, i.e. `2^256 / (target + 1)`.
    ///
    /// Computed as `~target / (target + 1) + 1` so it stays within 256 bits.
    pub fn block_proof(bits: u32) -> U256 {
        let decoded = decode_compact(bits);
        if !decoded.is_usable() {
            return U256::zero();
        }
        if decoded.target == U256::MAX {
            return U256::one();
        }
        (!decoded.target / (decoded.target + U256::one())) + U256::one()
    }

    /// Human readable target summary for logs.
    pub fn describe_target(bits: u32) -> String {
        let target = decode_compact(bits).target;
        let leading_zero_bits = 256 - target.bits();
        format!("bits {:#010x} (~{} leading zero bits)", bits, leading_zero_bits)
    }
}
