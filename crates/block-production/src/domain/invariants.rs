//! Invariant checkers for block production
//!
//! Run on every assembled template before it leaves the assembler. A failure
//! means the selector or the finalization step is broken, not that the pool
//! misbehaved.

use super::entities::BlockTemplate;
use crate::error::{BlockProductionError, Result};
use chain_types::{short_hex, Block, OutPoint, SerialNumber, TxIn};
use std::collections::HashSet;

fn violation(reason: String) -> BlockProductionError {
    BlockProductionError::InvariantViolation { reason }
}

/// Slot 0 is a coinbase, slot 1 a coinstake exactly when the template is proof-of-stake,
/// and the fee and sigop arrays run parallel to the transactions.
pub fn check_layout(template: &BlockTemplate) -> Result<()> {
    let txs = &template.block.transactions;
    if !txs.first().is_some_and(|tx| tx.is_coinbase()) {
        return Err(violation("first transaction is not a coinbase".into()));
    }
    if template.proof_of_stake != template.block.is_proof_of_stake() {
        return Err(violation(format!(
            "proof-of-stake flag {} disagrees with block layout",
            template.proof_of_stake
        )));
    }
    if txs.iter().skip(1).any(|tx| tx.is_coinbase()) {
        return Err(violation("coinbase outside slot 0".into()));
    }
    if template.tx_fees.len() != txs.len() || template.tx_sigops.len() != txs.len() {
        return Err(violation(format!(
            "{} transactions but {} fees and {} sigop entries",
            txs.len(),
            template.tx_fees.len(),
            template.tx_sigops.len()
        )));
    }
    Ok(())
}

/// Accounted size and sigops stay strictly below their budgets.
pub fn check_budgets(template: &BlockTemplate, max_block_size: usize, max_block_sigops: u32) -> Result<()> {
    let stats = &template.stats;
    if stats.block_size >= max_block_size {
        return Err(violation(format!(
            "block size {} reaches limit {}",
            stats.block_size, max_block_size
        )));
    }
    if stats.sigops >= max_block_sigops {
        return Err(violation(format!(
            "sigops {} reach limit {}",
            stats.sigops, max_block_sigops
        )));
    }
    Ok(())
}

/// No outpoint is spent twice within the block.
pub fn check_unique_prevouts(block: &Block) -> Result<()> {
    let mut seen: HashSet<&OutPoint> = HashSet::new();
    for prevout in block
        .transactions
        .iter()
        .filter(|tx| !tx.is_coinbase())
        .flat_map(|tx| tx.inputs.iter().filter_map(TxIn::prevout))
    {
        if !seen.insert(prevout) {
            return Err(violation(format!("outpoint {} spent twice", prevout)));
        }
    }
    Ok(())
}

/// No shielded serial is revealed twice within the block.
pub fn check_unique_serials(block: &Block) -> Result<()> {
    let mut seen: HashSet<&SerialNumber> = HashSet::new();
    for tx in &block.transactions {
        for spend in tx.shielded_spends() {
            if !seen.insert(&spend.serial) {
                return Err(violation(format!(
                    "serial {} revealed twice (tx {})",
                    spend.serial,
                    short_hex(&tx.txid())
                )));
            }
        }
    }
    Ok(())
}

/// All template checks.
pub fn check_template(template: &BlockTemplate, max_block_size: usize, max_block_sigops: u32) -> Result<()> {
    check_layout(template)?;
    check_budgets(template, max_block_size, max_block_sigops)?;
    check_unique_prevouts(&template.block)?;
    check_unique_serials(&template.block)?;
    Ok(())
}
