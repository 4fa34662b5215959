//! Consensus wire-format codec: transactions (legacy and SegWit) and the
//! 80-byte block header.
//!
//! Decoding is deliberately hand-rolled over [`ByteReader`] — the wire
//! layout is the subject matter of this crate, not an implementation
//! detail to delegate. Re-serialization exists because txid/size
//! computation needs both the stripped (witness-free) and full encodings
//! of a parsed transaction.

use bitcoin::Txid;
use bitcoin::hashes::Hash;

use crate::codec::ByteReader;
use crate::error::CoreError;

// ==============================================================================
// Wire structures
// ==============================================================================

/// A transaction as read off the wire, before analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: i32,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
    pub locktime: u32,
}

impl RawTransaction {
    /// A coinbase transaction has exactly one input spending the null
    /// outpoint sentinel.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// True when any input carries witness data.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    /// Previous txid in internal byte order (as on the wire).
    pub prev_txid: Txid,
    pub prev_vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl RawInput {
    /// Coinbase inputs carry the all-zero txid and vout `0xFFFFFFFF`.
    /// That outpoint is a sentinel, never a lookup key.
    pub fn is_coinbase(&self) -> bool {
        self.prev_vout == u32::MAX && self.prev_txid == Txid::all_zeros()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

// ==============================================================================
// Transaction decoding
// ==============================================================================

const SEGWIT_FLAG: u8 = 0x01;

/// Decode one consensus-serialized transaction from the reader.
///
/// Handles both the legacy layout and the BIP144 SegWit layout (zero
/// marker byte, flag, per-input witness stacks before the locktime).
pub fn decode_transaction(r: &mut ByteReader<'_>) -> Result<RawTransaction, CoreError> {
    let version = r.read_i32_le()?;

    let mut input_count = r.read_compact_size()?;
    let mut segwit_serialized = false;
    if input_count == 0 {
        // A zero "input count" is the BIP144 marker; the flag byte follows.
        if r.read_u8()? != SEGWIT_FLAG {
            return Err(CoreError::Truncated("transaction segwit flag"));
        }
        segwit_serialized = true;
        input_count = r.read_compact_size()?;
    }

    let input_count = checked_count(input_count, r, "transaction input count")?;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        inputs.push(decode_input(r)?);
    }

    let output_count = checked_count(r.read_compact_size()?, r, "transaction output count")?;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        outputs.push(decode_output(r)?);
    }

    if segwit_serialized {
        for input in &mut inputs {
            let item_count = checked_count(r.read_compact_size()?, r, "witness item count")?;
            let mut witness = Vec::with_capacity(item_count);
            for _ in 0..item_count {
                let len = checked_count(r.read_compact_size()?, r, "witness item")?;
                witness.push(r.read_bytes(len)?.to_vec());
            }
            input.witness = witness;
        }
    }

    let locktime = r.read_u32_le()?;

    Ok(RawTransaction {
        version,
        inputs,
        outputs,
        locktime,
    })
}

fn decode_input(r: &mut ByteReader<'_>) -> Result<RawInput, CoreError> {
    let prev_txid = Txid::from_byte_array(r.read_array_32()?);
    let prev_vout = r.read_u32_le()?;
    let script_len = checked_count(r.read_compact_size()?, r, "scriptSig")?;
    let script_sig = r.read_bytes(script_len)?.to_vec();
    let sequence = r.read_u32_le()?;
    Ok(RawInput {
        prev_txid,
        prev_vout,
        script_sig,
        sequence,
        witness: Vec::new(),
    })
}

fn decode_output(r: &mut ByteReader<'_>) -> Result<RawOutput, CoreError> {
    let value = r.read_u64_le()?;
    let script_len = checked_count(r.read_compact_size()?, r, "scriptPubKey")?;
    let script_pubkey = r.read_bytes(script_len)?.to_vec();
    Ok(RawOutput {
        value,
        script_pubkey,
    })
}

/// Bound a length/count prefix by the bytes actually remaining, so a
/// corrupt prefix fails as truncation instead of a huge allocation.
fn checked_count(
    count: u64,
    r: &ByteReader<'_>,
    what: &'static str,
) -> Result<usize, CoreError> {
    if count > r.remaining() as u64 {
        return Err(CoreError::Truncated(what));
    }
    Ok(count as usize)
}

// ==============================================================================
// Transaction serialization
// ==============================================================================

/// Serialize without witness data (the txid/base-size encoding).
pub fn serialize_stripped(tx: &RawTransaction) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&tx.version.to_le_bytes());
    write_body(&mut out, tx);
    out.extend_from_slice(&tx.locktime.to_le_bytes());
    out
}

/// Serialize in full. SegWit transactions (any input with witness data)
/// get the marker/flag bytes and witness stacks; for legacy transactions
/// this equals [`serialize_stripped`].
pub fn serialize_full(tx: &RawTransaction) -> Vec<u8> {
    if !tx.has_witness() {
        return serialize_stripped(tx);
    }
    let mut out = Vec::new();
    out.extend_from_slice(&tx.version.to_le_bytes());
    out.push(0x00);
    out.push(SEGWIT_FLAG);
    write_body(&mut out, tx);
    for input in &tx.inputs {
        write_compact_size(&mut out, input.witness.len() as u64);
        for item in &input.witness {
            write_compact_size(&mut out, item.len() as u64);
            out.extend_from_slice(item);
        }
    }
    out.extend_from_slice(&tx.locktime.to_le_bytes());
    out
}

/// The shared middle of both encodings: inputs, then outputs.
fn write_body(out: &mut Vec<u8>, tx: &RawTransaction) {
    write_compact_size(out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        out.extend_from_slice(&input.prev_txid.to_byte_array());
        out.extend_from_slice(&input.prev_vout.to_le_bytes());
        write_compact_size(out, input.script_sig.len() as u64);
        out.extend_from_slice(&input.script_sig);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_compact_size(out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        out.extend_from_slice(&output.value.to_le_bytes());
        write_compact_size(out, output.script_pubkey.len() as u64);
        out.extend_from_slice(&output.script_pubkey);
    }
}

/// Encode a CompactSize length prefix.
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xFC => out.push(n as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

// ==============================================================================
// Block header
// ==============================================================================

/// The six fixed fields of the 80-byte block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlockHeader {
    pub version: i32,
    /// Previous block hash, internal byte order.
    pub prev_hash: [u8; 32],
    /// Merkle root, internal byte order.
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// Decode the 80 header bytes.
pub fn decode_block_header(header_bytes: &[u8]) -> Result<RawBlockHeader, CoreError> {
    let mut r = ByteReader::new(header_bytes, "block header");
    let header = RawBlockHeader {
        version: r.read_i32_le()?,
        prev_hash: r.read_array_32()?,
        merkle_root: r.read_array_32()?,
        timestamp: r.read_u32_le()?,
        bits: r.read_u32_le()?,
        nonce: r.read_u32_le()?,
    };
    Ok(header)
}

// ==============================================================================
// Tests
// ==============================================================================
