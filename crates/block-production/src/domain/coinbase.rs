//! Coinbase construction and header refresh helpers.

use super::entities::ChainTip;
use chain_types::script::{encode_script_num, opcodes::OP_0, ScriptBuilder};
use chain_types::{Amount, Block, OutPoint, Transaction, TxIn, TxOut};
use primitive_types::H256;

/// `<height> OP_0`, the script_sig of a freshly assembled coinbase.
pub fn coinbase_script_sig(height: u32) -> Vec<u8> {
    ScriptBuilder::new()
        .push_int(i64::from(height))
        .push_opcode(OP_0)
        .into_bytes()
}

/// Coinbase paying `value` to `payout_script`.
///
/// Proof-of-stake blocks use an empty payout script and zero value.
pub fn build_coinbase(height: u32, payout_script: Vec<u8>, value: Amount) -> Transaction {
    Transaction::new(
        vec![TxIn::spend(OutPoint::null(), coinbase_script_sig(height))],
        vec![TxOut::new(value, payout_script)],
    )
}

/// Extra-nonce counter of one worker.
///
/// The counter restarts whenever the worker moves to a new parent block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtraNonce {
    prev_hash: H256,
    value: u32,
}

impl ExtraNonce {
    /// Current counter value.
    pub fn value(&self) -> u32 {
        self.value
    }
}

/// Bump the extra nonce and rewrite the coinbase as `<height> <extra_nonce>`.
///
/// The merkle root is recomputed so the header stays consistent.
pub fn increment_extra_nonce(block: &mut Block, height: u32, extra: &mut ExtraNonce) {
    if extra.prev_hash != block.header.prev_block {
        extra.value = 0;
        extra.prev_hash = block.header.prev_block;
    }
    extra.value = extra.value.wrapping_add(1);

    let script_sig = ScriptBuilder::new()
        .push_int(i64::from(height))
        .push_data(&encode_script_num(i64::from(extra.value)))
        .into_bytes();

    if let Some(TxIn::Spend {
        script_sig: slot, ..
    }) = block
        .transactions
        .first_mut()
        .and_then(|coinbase| coinbase.inputs.first_mut())
    {
        *slot = script_sig;
    }
    block.header.merkle_root = block.compute_merkle_root();
}

/// Move the header time to `max(median_time_past + 1, adjusted_time)`.
pub fn update_time(block: &mut Block, tip: &ChainTip, adjusted_time: i64) {
    let time = (tip.median_time_past + 1).max(adjusted_time);
    block.header.time = time.clamp(0, i64::from(u32::MAX)) as u32;
}
