//! Undo (rev) file decoding: reconstructing the outputs a block spent.
//!
//! A rev file is a concatenation of framed per-block records:
//! `[4-byte magic][4-byte LE size][CBlockUndo payload][32-byte hash]`.
//! Inside the payload, every integer is a CVarInt (never CompactSize,
//! except the two outer group counts), amounts are compressed, and
//! scripts are stored in one of six compressed forms.

use crate::codec::{decompress_amount, ByteReader};
use crate::error::CoreError;

// ==============================================================================
// Decoded structures
// ==============================================================================

/// One reconstructed spent output: what the spending input consumed.
/// The outpoint is attached later from the spending input itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoPrevout {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// The spent outputs of one block, grouped per non-coinbase transaction
/// in block order. Group `i` funds transaction `i + 1` of the block (the
/// coinbase has no undo entry).
#[derive(Debug, Clone)]
pub struct BlockUndo {
    pub spent_per_tx: Vec<Vec<UndoPrevout>>,
}

// ==============================================================================
// Record location
// ==============================================================================

/// Bytes of framing around each record's payload: magic + size before,
/// record hash after.
const FRAMING_PREFIX: usize = 8;
const FRAMING_HASH: usize = 32;

/// Find and decode the undo record with exactly `expected_tx_undos`
/// spent-output groups.
///
/// The first record in a rev file does not necessarily belong to the
/// first block of the paired blk file, so records whose leading group
/// count differs are skipped whole (the size field makes each record
/// self-delimiting). The trailing record hash guards against disk
/// corruption, not misalignment, and is not verified here.
pub fn find_block_undo(rev: &[u8], expected_tx_undos: u64) -> Result<BlockUndo, CoreError> {
    let mut offset = 0usize;
    while offset < rev.len() {
        let mut reader = ByteReader::new(&rev[offset..], "undo record framing");
        let _magic = reader.read_bytes(4)?;
        let record_size = reader.read_u32_le()? as usize;

        let payload_start = offset + FRAMING_PREFIX;
        let payload_end = payload_start
            .checked_add(record_size)
            .filter(|&end| end <= rev.len())
            .ok_or(CoreError::Truncated("undo record payload"))?;
        let payload = &rev[payload_start..payload_end];

        let mut peek = ByteReader::new(payload, "undo record");
        let num_tx_undos = peek.read_compact_size()?;
        if num_tx_undos != expected_tx_undos {
            tracing::debug!(
                offset,
                num_tx_undos,
                expected_tx_undos,
                "skipping undo record for a neighbouring block"
            );
            offset = payload_end + FRAMING_HASH;
            continue;
        }

        return decode_block_undo(payload);
    }
    Err(CoreError::UndoNotFound {
        expected: expected_tx_undos,
    })
}

/// Decode a CBlockUndo payload.
pub fn decode_block_undo(payload: &[u8]) -> Result<BlockUndo, CoreError> {
    let mut reader = ByteReader::new(payload, "undo record");
    let num_tx_undos = reader.read_compact_size()?;
    if num_tx_undos > payload.len() as u64 {
        return Err(CoreError::Truncated("undo transaction count"));
    }

    let mut spent_per_tx = Vec::with_capacity(num_tx_undos as usize);
    for _ in 0..num_tx_undos {
        let num_inputs = reader.read_compact_size()?;
        if num_inputs > payload.len() as u64 {
            return Err(CoreError::Truncated("undo input count"));
        }
        let mut spent = Vec::with_capacity(num_inputs as usize);
        for _ in 0..num_inputs {
            spent.push(decode_txin_undo(&mut reader)?);
        }
        spent_per_tx.push(spent);
    }
    Ok(BlockUndo { spent_per_tx })
}

// ==============================================================================
// TxInUndo
// ==============================================================================

/// Decode a single spent-output entry.
fn decode_txin_undo(reader: &mut ByteReader<'_>) -> Result<UndoPrevout, CoreError> {
    // nCode = height * 2 + coinbase flag.
    let code = reader.read_cvarint()?;
    let height = code >> 1;
    if height > 0 {
        // Legacy per-entry version field, always zero; present but unused.
        let _version = reader.read_cvarint()?;
    }
    let value = decompress_amount(reader.read_cvarint()?);
    let script_pubkey = decompress_script(reader)?;
    Ok(UndoPrevout {
        value,
        script_pubkey,
    })
}

/// Expand one of the six compressed script forms back to script bytes.
fn decompress_script(reader: &mut ByteReader<'_>) -> Result<Vec<u8>, CoreError> {
    let size_code = reader.read_cvarint()?;
    match size_code {
        // P2PKH by key hash.
        0 => {
            let hash = reader.read_bytes(20)?;
            let mut script = Vec::with_capacity(25);
            script.extend_from_slice(&[0x76, 0xA9, 0x14]);
            script.extend_from_slice(hash);
            script.extend_from_slice(&[0x88, 0xAC]);
            Ok(script)
        }
        // P2SH by script hash.
        1 => {
            let hash = reader.read_bytes(20)?;
            let mut script = Vec::with_capacity(23);
            script.extend_from_slice(&[0xA9, 0x14]);
            script.extend_from_slice(hash);
            script.push(0x87);
            Ok(script)
        }
        // Compressed P2PK; the size code doubles as the key parity byte.
        2 | 3 => {
            let x = reader.read_bytes(32)?;
            let mut script = Vec::with_capacity(35);
            script.push(0x21);
            script.push(size_code as u8);
            script.extend_from_slice(x);
            script.push(0xAC);
            Ok(script)
        }
        // Uncompressed P2PK stored compressed: recover the full point.
        4 | 5 => {
            let x = reader.read_bytes(32)?;
            let mut compressed = [0u8; 33];
            compressed[0] = (size_code - 2) as u8;
            compressed[1..].copy_from_slice(x);
            match bitcoin::secp256k1::PublicKey::from_slice(&compressed) {
                Ok(key) => {
                    let mut script = Vec::with_capacity(67);
                    script.push(0x41);
                    script.extend_from_slice(&key.serialize_uncompressed());
                    script.push(0xAC);
                    Ok(script)
                }
                // Not a curve point; keep the compressed form rather than
                // dropping the entry.
                Err(_) => {
                    tracing::warn!("undo P2PK x-coordinate is not on the curve; keeping compressed form");
                    let mut script = Vec::with_capacity(35);
                    script.push(0x21);
                    script.extend_from_slice(&compressed);
                    script.push(0xAC);
                    Ok(script)
                }
            }
        }
        // Raw script of (size_code - 6) bytes.
        _ => {
            let len = (size_code - 6) as usize;
            Ok(reader.read_bytes(len)?.to_vec())
        }
    }
}

// ==============================================================================
// Tests
// ==============================================================================
