//! Monetary amounts and fee rates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in base units.
pub type Amount = i64;

/// Base units per coin.
pub const COIN: Amount = 100_000_000;

/// Base units per cent.
pub const CENT: Amount = 1_000_000;

/// Whether `value` lies in `[0, max_money]`.
pub fn money_range(value: Amount, max_money: Amount) -> bool {
    (0..=max_money).contains(&value)
}

/// Fee rate in base units per 1000 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeeRate {
    per_kb: Amount,
}

impl FeeRate {
    /// Fee rate from an explicit per-kilobyte amount.
    pub const fn from_per_kb(per_kb: Amount) -> Self {
        Self { per_kb }
    }

    /// Fee rate paid by `fee` over `size` bytes.
    pub fn new(fee: Amount, size: usize) -> Self {
        let per_kb = if size > 0 {
            fee.saturating_mul(1000) / size as Amount
        } else {
            0
        };
        Self { per_kb }
    }

    /// Rate in base units per 1000 bytes.
    pub fn per_kb(&self) -> Amount {
        self.per_kb
    }

    /// Fee owed for `size` bytes at this rate (never rounds a positive rate down to zero).
    pub fn fee_for(&self, size: usize) -> Amount {
        let fee = self.per_kb.saturating_mul(size as Amount) / 1000;
        if fee == 0 && self.per_kb > 0 {
            self.per_kb
        } else {
            fee
        }
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.per_kb < 0 { "-" } else { "" };
        let abs = self.per_kb.unsigned_abs();
        write!(
            f,
            "{}{}.{:08} per kB",
            sign,
            abs / COIN as u64,
            abs % COIN as u64
        )
    }
}
