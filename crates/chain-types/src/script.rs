//! Script inspection for resource accounting.
//!
//! Scripts are never executed here. This module walks opcodes well enough to
//! count signature operations, recognise pay-to-script-hash outputs and build
//! the small push-only scripts the coinbase needs.

/// Opcode constants used by the sigop counter and script builder.
pub mod opcodes {
    #![allow(missing_docs)]
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;
    pub const OP_CHECKMULTISIG: u8 = 0xae;
    pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
    pub const OP_INVALIDOPCODE: u8 = 0xff;
}

use opcodes::*;

/// Sigops charged for a bare multisig when the key count is not inspected.
pub const MAX_PUBKEYS_PER_MULTISIG: u32 = 20;

/// One decoded opcode together with any data it pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Raw opcode byte.
    pub opcode: u8,
    /// Pushed bytes (empty for non-push opcodes).
    pub data: &'a [u8],
}

/// Iterator over the instructions of a script. Stops at the first truncated push.
pub struct Instructions<'a> {
    script: &'a [u8],
    pos: usize,
}

impl<'a> Instructions<'a> {
    /// Start iterating `script`.
    pub fn new(script: &'a [u8]) -> Self {
        Self { script, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.script.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn read_len(&mut self, width: usize) -> Option<usize> {
        let bytes = self.take(width)?;
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(bytes);
        Some(u32::from_le_bytes(buf) as usize)
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let opcode = *self.script.get(self.pos)?;
        self.pos += 1;

        let len = match opcode {
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => self.read_len(1)?,
            OP_PUSHDATA2 => self.read_len(2)?,
            OP_PUSHDATA4 => self.read_len(4)?,
            _ => 0,
        };
        let data = self.take(len)?;
        Some(Instruction { opcode, data })
    }
}

fn decode_op_n(opcode: u8) -> u32 {
    if opcode == OP_0 {
        0
    } else {
        u32::from(opcode - (OP_1 - 1))
    }
}

/// Count signature operations in a script.
///
/// With `accurate`, a multisig preceded by `OP_n` is charged `n` sigops instead of the
/// flat [`MAX_PUBKEYS_PER_MULTISIG`].
pub fn sigop_count(script: &[u8], accurate: bool) -> u32 {
    let mut count = 0u32;
    let mut last_opcode = OP_INVALIDOPCODE;
    for instruction in Instructions::new(script) {
        match instruction.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                if accurate && (OP_1..=OP_16).contains(&last_opcode) {
                    count += decode_op_n(last_opcode);
                } else {
                    count += MAX_PUBKEYS_PER_MULTISIG;
                }
            }
            _ => {}
        }
        last_opcode = instruction.opcode;
    }
    count
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Data of the final push in a push-only script, `None` if any opcode is not a push.
pub fn last_push_data(script_sig: &[u8]) -> Option<&[u8]> {
    let mut last = None;
    for instruction in Instructions::new(script_sig) {
        if instruction.opcode > OP_16 {
            return None;
        }
        last = Some(instruction.data);
    }
    last
}

/// Sigops of the redeem script revealed by `script_sig` when spending a P2SH output.
pub fn p2sh_sigop_count(script_pubkey: &[u8], script_sig: &[u8]) -> u32 {
    if !is_pay_to_script_hash(script_pubkey) {
        return 0;
    }
    last_push_data(script_sig)
        .map(|redeem| sigop_count(redeem, true))
        .unwrap_or(0)
}

/// Minimal little-endian script number encoding.
pub fn encode_script_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Builder for push-only scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an integer using the small-integer opcodes where possible.
    pub fn push_int(mut self, value: i64) -> Self {
        match value {
            0 => self.bytes.push(OP_0),
            -1 => self.bytes.push(OP_1NEGATE),
            1..=16 => self.bytes.push(OP_1 + (value as u8 - 1)),
            _ => return self.push_data(&encode_script_num(value)),
        }
        self
    }

    /// Push raw bytes with the smallest push opcode.
    pub fn push_data(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            self.bytes.push(len as u8);
        } else if len <= 0xff {
            self.bytes.push(OP_PUSHDATA1);
            self.bytes.push(len as u8);
        } else if len <= 0xffff {
            self.bytes.push(OP_PUSHDATA2);
            self.bytes.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.bytes.push(OP_PUSHDATA4);
            self.bytes.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    /// Append a bare opcode.
    pub fn push_opcode(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    /// Finished script bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Standard pay-to-pubkey-hash script.
pub fn pay_to_pubkey_hash(hash: &[u8; 20]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_bytes()
}

/// Standard pay-to-script-hash script.
pub fn pay_to_script_hash(hash: &[u8; 20]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_HASH160)
        .push_data(hash)
        .push_opcode(OP_EQUAL)
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multisig_2_of_3() -> Vec<u8> {
        ScriptBuilder::new()
            .push_int(2)
            .push_data(&[2u8; 33])
            .push_data(&[3u8; 33])
            .push_data(&[4u8; 33])
            .push_int(3)
            .push_opcode(OP_CHECKMULTISIG)
            .into_bytes()
    }

    #[test]
    fn test_p2pkh_has_one_sigop() {
        let script = pay_to_pubkey_hash(&[0xAB; 20]);
        assert_eq!(sigop_count(&script, false), 1);
        assert!(!is_pay_to_script_hash(&script));
    }

    #[test]
    fn test_multisig_accurate_vs_legacy() {
        let script = multisig_2_of_3();
        assert_eq!(sigop_count(&script, false), MAX_PUBKEYS_PER_MULTISIG);
        assert_eq!(sigop_count(&script, true), 3);
    }

    #[test]
    fn test_push_data_is_not_counted() {
        // 0xac inside pushed bytes is data, not OP_CHECKSIG
        let script = ScriptBuilder::new().push_data(&[OP_CHECKSIG; 10]).into_bytes();
        assert_eq!(sigop_count(&script, false), 0);
    }

    #[test]
    fn test_p2sh_redeem_script_sigops() {
        let redeem = multisig_2_of_3();
        let script_pubkey = pay_to_script_hash(&[0x11; 20]);
        let script_sig = ScriptBuilder::new()
            .push_int(0)
            .push_data(&[0x30; 71])
            .push_data(&redeem)
            .into_bytes();

        assert!(is_pay_to_script_hash(&script_pubkey));
        assert_eq!(p2sh_sigop_count(&script_pubkey, &script_sig), 3);
        assert_eq!(p2sh_sigop_count(&pay_to_pubkey_hash(&[0; 20]), &script_sig), 0);
    }

    #[test]
    fn test_non_push_script_sig_has_no_redeem_script() {
        let script_sig = ScriptBuilder::new().push_opcode(OP_DUP).into_bytes();
        assert_eq!(last_push_data(&script_sig), None);
    }

    #[test]
    fn test_truncated_push_stops_iteration() {
        let script = vec![OP_CHECKSIG, 0x05, 0x01];
        assert_eq!(Instructions::new(&script).count(), 1);
    }

    #[test]
    fn test_script_num_encoding() {
        assert_eq!(encode_script_num(0), Vec::<u8>::new());
        assert_eq!(encode_script_num(127), vec![0x7f]);
        assert_eq!(encode_script_num(128), vec![0x80, 0x00]);
        assert_eq!(encode_script_num(-1), vec![0x81]);
        assert_eq!(encode_script_num(1391), vec![0x6f, 0x05]);
    }

    #[test]
    fn test_push_int_small_values_use_opcodes() {
        assert_eq!(ScriptBuilder::new().push_int(0).into_bytes(), vec![OP_0]);
        assert_eq!(ScriptBuilder::new().push_int(16).into_bytes(), vec![OP_16]);
        assert_eq!(ScriptBuilder::new().push_int(17).into_bytes(), vec![0x01, 17]);
    }
}
