//! Block analysis: pair a blk file with its rev file and produce the
//! full block record.
//!
//! Both files are XOR de-obfuscated with the shared key, fully buffered,
//! and decoded in one pass. Only the first block record of the blk file
//! is analyzed; trailing blocks in the same file are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Network, OutPoint, Txid};

use crate::codec::{double_sha256, xor_decode, ByteReader};
use crate::error::CoreError;
use crate::fixture::{PrevoutSet, ResolvedPrevout};
use crate::script::ScriptType;
use crate::tx::analyze_transaction;
use crate::types::{
    BlockHeaderRecord, BlockRecord, BlockStats, CoinbaseRecord, ErrorRecord, TxRecord,
};
use crate::undo::find_block_undo;
use crate::wire::{decode_block_header, decode_transaction, serialize_stripped, RawTransaction};

// ==============================================================================
// File-level entry point
// ==============================================================================

/// Analyze the first block of `blk_path`, pairing it with the undo data
/// in `rev_path`. Both files are de-obfuscated with the key read from
/// `xor_path`; no key (or an empty/all-zero key file) is a no-op.
pub fn analyze_block_files(
    blk_path: &Path,
    rev_path: &Path,
    xor_path: Option<&Path>,
) -> Result<BlockRecord, CoreError> {
    let key = match xor_path {
        Some(path) => read_file(path)?,
        None => Vec::new(),
    };
    let blk = xor_decode(&read_file(blk_path)?, &key);
    let rev = xor_decode(&read_file(rev_path)?, &key);
    analyze_block(&blk, &rev)
}

fn read_file(path: &Path) -> Result<Vec<u8>, CoreError> {
    std::fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => CoreError::FileNotFound(path.to_path_buf()),
        _ => CoreError::Io(err),
    })
}

// ==============================================================================
// Block analysis
// ==============================================================================

/// Analyze the first block record of an already de-obfuscated blk byte
/// stream against its rev byte stream.
///
/// Data-consistency failures (merkle mismatch, undo problems, a failing
/// transaction) return an `ok = false` record that still carries the
/// decoded header; stream-level failures return an error.
pub fn analyze_block(blk: &[u8], rev: &[u8]) -> Result<BlockRecord, CoreError> {
    let mut reader = ByteReader::new(blk, "block file");
    let magic_bytes = reader.read_bytes(4)?;
    let magic = [magic_bytes[0], magic_bytes[1], magic_bytes[2], magic_bytes[3]];
    let _record_size = reader.read_u32_le()?;

    let header_bytes = reader.read_bytes(80)?;
    let header = decode_block_header(header_bytes)?;
    let block_hash = BlockHash::from_byte_array(double_sha256(header_bytes));

    let tx_count = reader.read_compact_size()?;
    if tx_count == 0 || tx_count > reader.remaining() as u64 {
        return Err(CoreError::Truncated("block transaction count"));
    }
    let mut txs: Vec<RawTransaction> = Vec::with_capacity(tx_count as usize);
    for _ in 0..tx_count {
        txs.push(decode_transaction(&mut reader)?);
    }

    // Merkle verification over the txids, bottom-up.
    let txids: Vec<[u8; 32]> = txs
        .iter()
        .map(|tx| double_sha256(&serialize_stripped(tx)))
        .collect();
    let merkle_root_valid = compute_merkle_root(&txids) == header.merkle_root;

    let header_record = BlockHeaderRecord {
        hash: block_hash,
        version: header.version,
        prev_hash: BlockHash::from_byte_array(header.prev_hash),
        merkle_root: Txid::from_byte_array(header.merkle_root),
        merkle_root_valid,
        timestamp: header.timestamp,
        bits: format!("{:08x}", header.bits),
        nonce: header.nonce,
    };

    if !merkle_root_valid {
        tracing::warn!(block = %block_hash, "merkle root mismatch");
        return Ok(block_failure(
            &CoreError::InvalidMerkleRoot,
            header_record,
            tx_count,
        ));
    }

    // Undo data for the (tx_count - 1) non-coinbase transactions.
    let undo = match find_block_undo(rev, tx_count - 1) {
        Ok(undo) => undo,
        Err(err @ CoreError::UndoNotFound { .. }) => {
            return Ok(block_failure(&err, header_record, tx_count));
        }
        Err(err) => {
            let wrapped = CoreError::InvalidUndoData(err.to_string());
            return Ok(block_failure(&wrapped, header_record, tx_count));
        }
    };

    let coinbase_record = summarize_coinbase(&txs[0]);
    let network = network_from_magic(magic);

    let mut transactions: Vec<TxRecord> = Vec::with_capacity(txs.len());
    for (index, tx) in txs.iter().enumerate() {
        let prevouts = if index == 0 {
            // Coinbase: no prevouts, no fee.
            PrevoutSet::default()
        } else {
            let spent = &undo.spent_per_tx[index - 1];
            if spent.len() != tx.inputs.len() {
                let err = CoreError::InvalidUndoData(format!(
                    "transaction {index} has {} inputs but {} undo entries",
                    tx.inputs.len(),
                    spent.len()
                ));
                return Ok(block_failure(&err, header_record, tx_count));
            }
            match pair_prevouts(tx, spent) {
                Ok(set) => set,
                Err(err) => return Ok(block_failure(&err, header_record, tx_count)),
            }
        };

        match analyze_transaction(tx, &prevouts, network) {
            Ok(record) => transactions.push(record),
            // One failing transaction aborts the whole block.
            Err(err) => return Ok(block_failure(&err, header_record, tx_count)),
        }
    }

    let block_stats = aggregate_stats(&transactions);

    Ok(BlockRecord {
        ok: true,
        mode: "block",
        block_header: Some(header_record),
        tx_count: Some(tx_count),
        coinbase: Some(coinbase_record),
        transactions,
        block_stats: Some(block_stats),
        error: None,
    })
}

fn block_failure(err: &CoreError, header: BlockHeaderRecord, tx_count: u64) -> BlockRecord {
    BlockRecord {
        ok: false,
        mode: "block",
        block_header: Some(header),
        tx_count: Some(tx_count),
        coinbase: None,
        transactions: Vec::new(),
        block_stats: None,
        error: Some(ErrorRecord::from(err)),
    }
}

/// Key each reconstructed prevout by the outpoint of the input that
/// spends it; undo entries are stored in input order.
fn pair_prevouts(
    tx: &RawTransaction,
    spent: &[crate::undo::UndoPrevout],
) -> Result<PrevoutSet, CoreError> {
    let mut set = PrevoutSet::default();
    for (input, undo_prevout) in tx.inputs.iter().zip(spent) {
        set.insert(
            OutPoint::new(input.prev_txid, input.prev_vout),
            ResolvedPrevout {
                value: bitcoin::Amount::from_sat(undo_prevout.value),
                script_pubkey: undo_prevout.script_pubkey.clone(),
            },
        )?;
    }
    Ok(set)
}

/// Pick address-encoding parameters from the outer record magic.
fn network_from_magic(magic: [u8; 4]) -> Network {
    match magic {
        [0x0B, 0x11, 0x09, 0x07] => Network::Testnet,
        _ => Network::Bitcoin,
    }
}

// ==============================================================================
// Merkle root
// ==============================================================================

/// Iterative bottom-up pairwise reduction; a level with an odd node
/// count pairs its last node with itself.
fn compute_merkle_root(txids: &[[u8; 32]]) -> [u8; 32] {
    if txids.is_empty() {
        return [0u8; 32];
    }
    let mut level = txids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1]);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks_exact(2) {
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(&pair[0]);
            concat[32..].copy_from_slice(&pair[1]);
            next.push(double_sha256(&concat));
        }
        level = next;
    }
    level[0]
}

// ==============================================================================
// Coinbase summary
// ==============================================================================

fn summarize_coinbase(coinbase: &RawTransaction) -> CoinbaseRecord {
    let script_sig = coinbase
        .inputs
        .first()
        .map(|input| input.script_sig.as_slice())
        .unwrap_or(&[]);
    CoinbaseRecord {
        bip34_height: decode_bip34_height(script_sig),
        script_sig_hex: hex::encode(script_sig),
        total_output_sats: coinbase
            .outputs
            .iter()
            .fold(0u64, |acc, output| acc.saturating_add(output.value)),
    }
}

/// Decode the BIP34 height push at the start of a coinbase scriptSig:
/// one length byte (1..=8), then that many little-endian bytes. Returns
/// zero when the push is malformed.
fn decode_bip34_height(script_sig: &[u8]) -> u64 {
    let Some(&push_len) = script_sig.first() else {
        return 0;
    };
    let push_len = push_len as usize;
    if !(1..=8).contains(&push_len) || script_sig.len() < 1 + push_len {
        return 0;
    }
    let mut height = 0u64;
    for (i, &byte) in script_sig[1..=push_len].iter().enumerate() {
        height |= u64::from(byte) << (8 * i);
    }
    height
}

// ==============================================================================
// Aggregate statistics
// ==============================================================================

fn aggregate_stats(transactions: &[TxRecord]) -> BlockStats {
    let total_fees_sats: i64 = transactions.iter().skip(1).map(|tx| tx.fee_sats).sum();
    let total_weight: u64 = transactions.iter().map(|tx| tx.weight).sum();

    let avg_fee_rate_sat_vb = if total_weight == 0 {
        0.0
    } else {
        let block_vbytes = total_weight.div_ceil(4);
        (total_fees_sats as f64 / block_vbytes as f64 * 100.0).round() / 100.0
    };

    let mut script_type_summary: BTreeMap<ScriptType, u64> = BTreeMap::new();
    for tx in transactions {
        for output in &tx.vout {
            *script_type_summary.entry(output.script_type).or_insert(0) += 1;
        }
    }

    BlockStats {
        total_fees_sats,
        total_weight,
        avg_fee_rate_sat_vb,
        script_type_summary,
    }
}

// ==============================================================================
// Tests
// ==============================================================================
