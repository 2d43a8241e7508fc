//! Transactions, inputs and outputs.

use crate::amount::Amount;
use crate::encoding::{write_compact_size, write_var_bytes};
use crate::hashing::hash256;
use crate::script;
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number that marks an input as final.
pub const SEQUENCE_FINAL: u32 = u32::MAX;

/// Lock times below this value are block heights, above it unix timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Reference to a specific output of a prior transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Id of the transaction that created the output.
    pub txid: H256,
    /// Output position within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// Reference output `index` of `txid`.
    pub fn new(txid: H256, index: u32) -> Self {
        Self { txid, index }
    }

    /// The null reference carried by coinbase inputs.
    pub fn null() -> Self {
        Self {
            txid: H256::zero(),
            index: u32::MAX,
        }
    }

    /// Whether this is the coinbase null reference.
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid.as_bytes()), self.index)
    }
}

/// Opaque serial number revealed by a shielded-coin spend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SerialNumber(pub Vec<u8>);

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Shielded-coin spend carried in place of a prevout reference.
///
/// The proof is opaque here; its validity is decided by an external predicate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedSpend {
    /// Serial number of the spent coin.
    pub serial: SerialNumber,
    /// Face value released by the spend.
    pub denomination: Amount,
    /// Checksum of the accumulator the proof was made against.
    pub accumulator_checksum: u32,
    /// Serialized spend proof.
    pub proof: Vec<u8>,
}

/// Transaction input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxIn {
    /// Spends a prior output.
    Spend {
        /// Output being spent.
        prevout: OutPoint,
        /// Unlocking script.
        script_sig: Vec<u8>,
        /// Input sequence number.
        sequence: u32,
    },
    /// Spends a shielded coin by revealing its serial.
    Shielded(ShieldedSpend),
}

impl TxIn {
    /// Final-sequence input spending `prevout`.
    pub fn spend(prevout: OutPoint, script_sig: Vec<u8>) -> Self {
        TxIn::Spend {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }

    /// Referenced output, if this is a conventional spend.
    pub fn prevout(&self) -> Option<&OutPoint> {
        match self {
            TxIn::Spend { prevout, .. } => Some(prevout),
            TxIn::Shielded(_) => None,
        }
    }

    /// Unlocking script (empty for shielded spends).
    pub fn script_sig(&self) -> &[u8] {
        match self {
            TxIn::Spend { script_sig, .. } => script_sig,
            TxIn::Shielded(_) => &[],
        }
    }

    /// Sequence number (shielded spends are always final).
    pub fn sequence(&self) -> u32 {
        match self {
            TxIn::Spend { sequence, .. } => *sequence,
            TxIn::Shielded(_) => SEQUENCE_FINAL,
        }
    }

    /// Shielded spend payload, if any.
    pub fn shielded(&self) -> Option<&ShieldedSpend> {
        match self {
            TxIn::Spend { .. } => None,
            TxIn::Shielded(spend) => Some(spend),
        }
    }

    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            TxIn::Spend {
                prevout,
                script_sig,
                sequence,
            } => {
                out.push(0);
                out.extend_from_slice(prevout.txid.as_bytes());
                out.extend_from_slice(&prevout.index.to_le_bytes());
                write_var_bytes(out, script_sig);
                out.extend_from_slice(&sequence.to_le_bytes());
            }
            TxIn::Shielded(spend) => {
                out.push(1);
                write_var_bytes(out, &spend.serial.0);
                out.extend_from_slice(&spend.denomination.to_le_bytes());
                out.extend_from_slice(&spend.accumulator_checksum.to_le_bytes());
                write_var_bytes(out, &spend.proof);
            }
        }
    }
}

/// Transaction output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Value in base units.
    pub value: Amount,
    /// Locking script.
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// Output paying `value` to `script_pubkey`.
    pub fn new(value: Amount, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    /// Zero-value output with an empty script (coinstake marker, PoS coinbase).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this is the empty marker output.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// A transaction as observed from the pending pool or a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Format version.
    pub version: i32,
    /// Inputs in order.
    pub inputs: Vec<TxIn>,
    /// Outputs in order.
    pub outputs: Vec<TxOut>,
    /// Height or time before which the transaction is not final.
    pub lock_time: u32,
}

impl Transaction {
    /// Version 1 transaction with no lock time.
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Canonical encoding used for hashing and size accounting.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.inputs.len() * 48 + self.outputs.len() * 34);
        out.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode_to(&mut out);
        }
        write_compact_size(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut out, &output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Transaction id.
    pub fn txid(&self) -> H256 {
        hash256(&self.encode())
    }

    /// Encoded size in bytes.
    pub fn serialized_size(&self) -> usize {
        self.encode().len()
    }

    /// Single input with a null prevout.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout().is_some_and(OutPoint::is_null)
    }

    /// Spends at least one real prevout and opens with the empty marker output.
    pub fn is_coinstake(&self) -> bool {
        self.inputs
            .first()
            .and_then(TxIn::prevout)
            .is_some_and(|prevout| !prevout.is_null())
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    /// Whether any input is a shielded spend.
    pub fn has_shielded_spends(&self) -> bool {
        self.inputs.iter().any(|input| input.shielded().is_some())
    }

    /// Iterator over the shielded spends in input order.
    pub fn shielded_spends(&self) -> impl Iterator<Item = &ShieldedSpend> {
        self.inputs.iter().filter_map(TxIn::shielded)
    }

    /// Value released by shielded spends.
    pub fn shielded_value_in(&self) -> Amount {
        self.shielded_spends()
            .fold(0, |acc: Amount, spend| acc.saturating_add(spend.denomination))
    }

    /// Sum of output values.
    pub fn value_out(&self) -> Amount {
        self.outputs
            .iter()
            .fold(0, |acc: Amount, output| acc.saturating_add(output.value))
    }

    /// Lock-time finality at `height` and `block_time`.
    pub fn is_final(&self, height: u32, block_time: i64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let threshold = if self.lock_time < LOCKTIME_THRESHOLD {
            i64::from(height)
        } else {
            block_time
        };
        if i64::from(self.lock_time) < threshold {
            return true;
        }
        self.inputs
            .iter()
            .all(|input| input.sequence() == SEQUENCE_FINAL)
    }

    /// Sigops visible without looking up spent outputs.
    pub fn legacy_sigop_count(&self) -> u32 {
        let inputs: u32 = self
            .inputs
            .iter()
            .map(|input| script::sigop_count(input.script_sig(), false))
            .sum();
        let outputs: u32 = self
            .outputs
            .iter()
            .map(|output| script::sigop_count(&output.script_pubkey, false))
            .sum();
        inputs + outputs
    }

    /// Priority from the `value * age` sum over a size that discounts input scripts.
    ///
    /// Each input removes `41 + min(110, script_sig length)` bytes from the size, so
    /// spending many inputs is not penalised.
    pub fn compute_priority(&self, priority_inputs: f64, size: usize) -> f64 {
        let mut modified = size;
        for input in &self.inputs {
            let offset = 41 + input.script_sig().len().min(110);
            if modified > offset {
                modified -= offset;
            }
        }
        if modified == 0 {
            0.0
        } else {
            priority_inputs / modified as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::COIN;

    fn spend_tx(parent: H256) -> Transaction {
        Transaction::new(
            vec![TxIn::spend(OutPoint::new(parent, 0), vec![0x51])],
            vec![TxOut::new(COIN, vec![0xac])],
        )
    }

    #[test]
    fn test_txid_changes_with_content() {
        let a = spend_tx(H256::repeat_byte(1));
        let b = spend_tx(H256::repeat_byte(2));
        assert_ne!(a.txid(), b.txid());
        assert_eq!(a.txid(), a.clone().txid());
        assert_eq!(a.serialized_size(), a.encode().len());
    }

    #[test]
    fn test_coinbase_and_coinstake_predicates() {
        let coinbase = Transaction::new(
            vec![TxIn::spend(OutPoint::null(), vec![1, 2])],
            vec![TxOut::new(50 * COIN, vec![])],
        );
        assert!(coinbase.is_coinbase());
        assert!(!coinbase.is_coinstake());

        let coinstake = Transaction::new(
            vec![TxIn::spend(OutPoint::new(H256::repeat_byte(9), 1), vec![])],
            vec![TxOut::empty(), TxOut::new(10 * COIN, vec![0xac])],
        );
        assert!(coinstake.is_coinstake());
        assert!(!coinstake.is_coinbase());
        assert!(!spend_tx(H256::repeat_byte(3)).is_coinstake());
    }

    #[test]
    fn test_shielded_value_in() {
        let tx = Transaction::new(
            vec![
                TxIn::Shielded(ShieldedSpend {
                    serial: SerialNumber(vec![1]),
                    denomination: 5 * COIN,
                    accumulator_checksum: 7,
                    proof: vec![],
                }),
                TxIn::Shielded(ShieldedSpend {
                    serial: SerialNumber(vec![2]),
                    denomination: 10 * COIN,
                    accumulator_checksum: 7,
                    proof: vec![],
                }),
            ],
            vec![TxOut::new(15 * COIN, vec![])],
        );
        assert!(tx.has_shielded_spends());
        assert_eq!(tx.shielded_value_in(), 15 * COIN);
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_lock_time_finality() {
        let mut tx = spend_tx(H256::repeat_byte(4));
        assert!(tx.is_final(10, 0));

        tx.lock_time = 100;
        tx.inputs = vec![TxIn::Spend {
            prevout: OutPoint::new(H256::repeat_byte(4), 0),
            script_sig: vec![],
            sequence: 0,
        }];
        assert!(!tx.is_final(100, 0));
        assert!(tx.is_final(101, 0));

        tx.lock_time = LOCKTIME_THRESHOLD + 10;
        assert!(!tx.is_final(1_000_000, i64::from(LOCKTIME_THRESHOLD)));
        assert!(tx.is_final(0, i64::from(LOCKTIME_THRESHOLD) + 11));
    }

    #[test]
    fn test_final_sequence_overrides_lock_time() {
        let mut tx = spend_tx(H256::repeat_byte(5));
        tx.lock_time = 500;
        assert!(tx.is_final(1, 0));
    }

    #[test]
    fn test_priority_monotonic() {
        let tx = spend_tx(H256::repeat_byte(6));
        let size = tx.serialized_size() + 200;
        let low = tx.compute_priority(1_000.0, size);
        let high = tx.compute_priority(2_000.0, size);
        let bigger = tx.compute_priority(1_000.0, size + 100);
        assert!(high > low);
        assert!(bigger < low);
        assert_eq!(tx.compute_priority(1_000.0, 0), 0.0);
    }

    #[test]
    fn test_legacy_sigops() {
        let tx = spend_tx(H256::repeat_byte(7));
        assert_eq!(tx.legacy_sigop_count(), 1);
    }
}
