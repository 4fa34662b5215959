//! Shared test helpers for blockscope-core unit tests.
//!
//! Consolidates script-template builders, raw-transaction construction,
//! fixture assembly, and the undo-side encoders (CVarInt, amount
//! compression) so tests across modules share a single source of truth
//! for dummy data.

use bitcoin::hashes::Hash;
use bitcoin::{Amount, Txid};

use crate::fixture::{FixturePrevout, NetworkTag, TxFixture};
use crate::wire::{serialize_full, RawInput, RawOutput, RawTransaction};

// ==============================================================================
// Txid helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

// ==============================================================================
// Script templates
// ==============================================================================

pub fn p2pkh_script(fill: u8) -> Vec<u8> {
    let mut script = vec![0x76, 0xA9, 0x14];
    script.extend_from_slice(&[fill; 20]);
    script.extend_from_slice(&[0x88, 0xAC]);
    script
}

pub fn p2sh_script(fill: u8) -> Vec<u8> {
    let mut script = vec![0xA9, 0x14];
    script.extend_from_slice(&[fill; 20]);
    script.push(0x87);
    script
}

pub fn p2wpkh_script(fill: u8) -> Vec<u8> {
    let mut script = vec![0x00, 0x14];
    script.extend_from_slice(&[fill; 20]);
    script
}

pub fn p2wsh_script(fill: u8) -> Vec<u8> {
    let mut script = vec![0x00, 0x20];
    script.extend_from_slice(&[fill; 32]);
    script
}

pub fn p2tr_script(fill: u8) -> Vec<u8> {
    let mut script = vec![0x51, 0x20];
    script.extend_from_slice(&[fill; 32]);
    script
}

/// OP_RETURN with one direct push. Payloads must fit a direct push.
pub fn op_return_script(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 0x4B, "payload needs a PUSHDATA opcode");
    let mut script = vec![0x6A, payload.len() as u8];
    script.extend_from_slice(payload);
    script
}

// ==============================================================================
// Transaction builders
// ==============================================================================

/// A legacy input spending `funding_txid:vout` with a final sequence,
/// empty scriptSig, and no witness. Override fields after construction.
pub fn make_input(funding_txid: Txid, vout: u32) -> RawInput {
    RawInput {
        prev_txid: funding_txid,
        prev_vout: vout,
        script_sig: Vec::new(),
        sequence: 0xFFFF_FFFF,
        witness: Vec::new(),
    }
}

pub fn make_output(sats: u64, script_pubkey: Vec<u8>) -> RawOutput {
    RawOutput {
        value: sats,
        script_pubkey,
    }
}

pub fn make_tx(inputs: Vec<RawInput>, outputs: Vec<RawOutput>) -> RawTransaction {
    RawTransaction {
        version: 2,
        inputs,
        outputs,
        locktime: 0,
    }
}

// ==============================================================================
// Fixture builders
// ==============================================================================

pub fn prevout_for(txid: Txid, vout: u32, sats: u64, script_pubkey: Vec<u8>) -> FixturePrevout {
    FixturePrevout {
        txid,
        vout,
        value_sats: Amount::from_sat(sats),
        script_pubkey_hex: hex::encode(script_pubkey),
    }
}

/// Assemble a mainnet fixture from a transaction and its prevouts.
pub fn make_fixture(tx: &RawTransaction, prevouts: Vec<FixturePrevout>) -> TxFixture {
    TxFixture {
        network: NetworkTag::Mainnet,
        raw_tx: hex::encode(serialize_full(tx)),
        prevouts,
    }
}

// ==============================================================================
// Undo-side encoders
// ==============================================================================

/// Core's `WriteVarInt`: base-128 big-endian groups with a continuation
/// bit and an off-by-one on each continuation byte.
pub fn write_cvarint(out: &mut Vec<u8>, mut n: u64) {
    let mut tmp = [0u8; 10];
    let mut len = 0usize;
    loop {
        tmp[len] = (n & 0x7F) as u8 | if len > 0 { 0x80 } else { 0x00 };
        if n <= 0x7F {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    for i in (0..=len).rev() {
        out.push(tmp[i]);
    }
}

/// Core's `CompressAmount`, the inverse of `codec::decompress_amount`.
pub fn compress_amount(mut n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut e = 0u64;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decompress_amount, ByteReader};

    #[test]
    fn cvarint_encoder_matches_decoder() {
        for value in [0u64, 1, 127, 128, 255, 16_383, 16_384, 1_000_000, u32::MAX as u64] {
            let mut bytes = Vec::new();
            write_cvarint(&mut bytes, value);
            let mut reader = ByteReader::new(&bytes, "test");
            assert_eq!(reader.read_cvarint().unwrap(), value, "value {value}");
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn amount_compression_roundtrips() {
        for sats in [0u64, 1, 2, 545, 546, 1_000, 50_0000_0000, 20_999_999_9769_0000] {
            assert_eq!(decompress_amount(compress_amount(sats)), sats, "sats {sats}");
        }
    }
}
