//! End-to-end block analysis over fabricated on-disk files.
//!
//! Builds a two-transaction block, its undo record (preceded by a ghost
//! record for a neighbouring block, to exercise alignment), XOR-obfuscates
//! both files with a shared key, and drives the whole pipeline from disk.

use std::fs;
use std::path::PathBuf;

use bitcoin::hashes::Hash;
use bitcoin::Txid;

use blockscope_core::block::analyze_block_files;
use blockscope_core::codec::{double_sha256, xor_decode};
use blockscope_core::script::ScriptType;
use blockscope_core::types::BlockRecord;
use blockscope_core::wire::{
    serialize_full, serialize_stripped, write_compact_size, RawInput, RawOutput, RawTransaction,
};

const MAINNET_MAGIC: [u8; 4] = [0xF9, 0xBE, 0xB4, 0xD9];
const XOR_KEY: [u8; 8] = [0x5A, 0xA5, 0x3C, 0xC3, 0x0F, 0xF0, 0x99, 0x66];

const COINBASE_SUBSIDY: u64 = 50_000;
const SPENT_VALUE: u64 = 10_000;
const SPEND_OUTPUT: u64 = 9_000;

// ==============================================================================
// Builders
// ==============================================================================

fn p2pkh_script(fill: u8) -> Vec<u8> {
    let mut script = vec![0x76, 0xA9, 0x14];
    script.extend_from_slice(&[fill; 20]);
    script.extend_from_slice(&[0x88, 0xAC]);
    script
}

fn coinbase_tx() -> RawTransaction {
    RawTransaction {
        version: 2,
        inputs: vec![RawInput {
            prev_txid: Txid::all_zeros(),
            prev_vout: u32::MAX,
            // BIP34: push of the 3-byte height 840000 (0x0CD140).
            script_sig: vec![0x03, 0x40, 0xD1, 0x0C],
            sequence: 0xFFFF_FFFF,
            witness: Vec::new(),
        }],
        outputs: vec![RawOutput {
            value: COINBASE_SUBSIDY,
            script_pubkey: p2pkh_script(0x01),
        }],
        locktime: 0,
    }
}

fn spend_tx() -> RawTransaction {
    let mut funding = [0u8; 32];
    funding[0] = 0x99;
    RawTransaction {
        version: 2,
        inputs: vec![RawInput {
            prev_txid: Txid::from_byte_array(funding),
            prev_vout: 0,
            script_sig: Vec::new(),
            sequence: 0xFFFF_FFFF,
            witness: Vec::new(),
        }],
        outputs: vec![RawOutput {
            value: SPEND_OUTPUT,
            script_pubkey: p2pkh_script(0x07),
        }],
        locktime: 0,
    }
}

fn merkle_root(txids: &[[u8; 32]]) -> [u8; 32] {
    let mut level = txids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1]);
        }
        let mut next = Vec::new();
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

/// Assemble a framed blk record: header + transactions.
fn build_blk(txs: &[RawTransaction], merkle: [u8; 32]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&2i32.to_le_bytes()); // header version
    body.extend_from_slice(&[0x11; 32]); // prev hash
    body.extend_from_slice(&merkle);
    body.extend_from_slice(&1_700_000_000u32.to_le_bytes());
    body.extend_from_slice(&0x1D00_FFFFu32.to_le_bytes());
    body.extend_from_slice(&7u32.to_le_bytes());
    write_compact_size(&mut body, txs.len() as u64);
    for tx in txs {
        body.extend_from_slice(&serialize_full(tx));
    }

    let mut blk = Vec::new();
    blk.extend_from_slice(&MAINNET_MAGIC);
    blk.extend_from_slice(&(body.len() as u32).to_le_bytes());
    blk.extend_from_slice(&body);
    blk
}

// Core's WriteVarInt (test-side encoder for undo fixtures).
fn write_cvarint(out: &mut Vec<u8>, mut n: u64) {
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

// Core's CompressAmount.
fn compress_amount(mut n: u64) -> u64 {
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

/// One TxInUndo entry in the P2PKH-compressed form.
fn txin_undo_p2pkh(height: u64, value: u64, hash_fill: u8) -> Vec<u8> {
    let mut entry = Vec::new();
    write_cvarint(&mut entry, height * 2);
    if height > 0 {
        write_cvarint(&mut entry, 0);
    }
    write_cvarint(&mut entry, compress_amount(value));
    write_cvarint(&mut entry, 0);
    entry.extend_from_slice(&[hash_fill; 20]);
    entry
}

fn frame_undo_record(payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(&MAINNET_MAGIC);
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(payload);
    record.extend_from_slice(&[0xEE; 32]); // record hash, unverified
    record
}

/// Rev file: a ghost record for a 5-transaction neighbour block, then
/// the record matching our 2-transaction block.
fn build_rev() -> Vec<u8> {
    let mut ghost_payload = Vec::new();
    write_compact_size(&mut ghost_payload, 4);
    for _ in 0..4 {
        write_compact_size(&mut ghost_payload, 1);
        ghost_payload.extend_from_slice(&txin_undo_p2pkh(839_000, 1_234, 0x55));
    }

    let mut payload = Vec::new();
    write_compact_size(&mut payload, 1);
    write_compact_size(&mut payload, 1);
    payload.extend_from_slice(&txin_undo_p2pkh(839_990, SPENT_VALUE, 0xAB));

    let mut rev = frame_undo_record(&ghost_payload);
    rev.extend_from_slice(&frame_undo_record(&payload));
    rev
}

/// Write the obfuscated blk/rev/key triple into `dir`.
fn write_triple(dir: &std::path::Path, blk: &[u8], rev: &[u8]) -> (PathBuf, PathBuf, PathBuf) {
    let blk_path = dir.join("blk00042.dat");
    let rev_path = dir.join("rev00042.dat");
    let xor_path = dir.join("xor.dat");
    fs::write(&blk_path, xor_decode(blk, &XOR_KEY)).unwrap();
    fs::write(&rev_path, xor_decode(rev, &XOR_KEY)).unwrap();
    fs::write(&xor_path, XOR_KEY).unwrap();
    (blk_path, rev_path, xor_path)
}

fn analyze_fabricated_block() -> BlockRecord {
    let txs = [coinbase_tx(), spend_tx()];
    let txids: Vec<[u8; 32]> = txs
        .iter()
        .map(|tx| double_sha256(&serialize_stripped(tx)))
        .collect();
    let blk = build_blk(&txs, merkle_root(&txids));
    let rev = build_rev();

    let dir = tempfile::tempdir().unwrap();
    let (blk_path, rev_path, xor_path) = write_triple(dir.path(), &blk, &rev);
    analyze_block_files(&blk_path, &rev_path, Some(&xor_path)).unwrap()
}

// ==============================================================================
// Tests
// ==============================================================================

#[test]
fn analyzes_a_well_formed_block_end_to_end() {
    let record = analyze_fabricated_block();

    assert!(record.ok, "error: {:?}", record.error);
    assert_eq!(record.mode, "block");
    assert_eq!(record.tx_count, Some(2));
    assert_eq!(record.transactions.len(), 2);

    let header = record.block_header.expect("header present");
    assert!(header.merkle_root_valid);
    assert_eq!(header.bits, "1d00ffff");
    assert_eq!(header.nonce, 7);

    let coinbase = record.coinbase.expect("coinbase summary present");
    assert_eq!(coinbase.bip34_height, 840_000);
    assert_eq!(coinbase.total_output_sats, COINBASE_SUBSIDY);
    assert_eq!(coinbase.script_sig_hex, "0340d10c");
}

#[test]
fn fees_come_from_reconstructed_prevouts() {
    let record = analyze_fabricated_block();

    let coinbase = &record.transactions[0];
    assert_eq!(coinbase.fee_sats, 0);

    let spend = &record.transactions[1];
    assert_eq!(spend.total_input_sats, SPENT_VALUE);
    assert_eq!(spend.total_output_sats, SPEND_OUTPUT);
    assert_eq!(spend.fee_sats, (SPENT_VALUE - SPEND_OUTPUT) as i64);

    // The undo-reconstructed prevout classifies like the template it
    // decompressed to, and the input follows it.
    assert_eq!(spend.vin[0].script_type, ScriptType::P2pkh);
    let prevout = spend.vin[0].prevout.as_ref().expect("prevout resolved");
    assert_eq!(prevout.value_sats.to_sat(), SPENT_VALUE);
    assert!(spend.vin[0].address.is_some());

    let stats = record.block_stats.expect("stats present");
    assert_eq!(stats.total_fees_sats, 1_000);
    assert_eq!(
        stats.total_weight,
        record.transactions.iter().map(|tx| tx.weight).sum::<u64>()
    );
    assert_eq!(stats.script_type_summary.get(&ScriptType::P2pkh), Some(&2));
}

#[test]
fn merkle_mismatch_fails_closed_with_header() {
    let txs = [coinbase_tx(), spend_tx()];
    let blk = build_blk(&txs, [0xDE; 32]); // wrong root
    let rev = build_rev();

    let dir = tempfile::tempdir().unwrap();
    let (blk_path, rev_path, xor_path) = write_triple(dir.path(), &blk, &rev);
    let record = analyze_block_files(&blk_path, &rev_path, Some(&xor_path)).unwrap();

    assert!(!record.ok);
    assert_eq!(
        record.error.as_ref().map(|err| err.code.as_str()),
        Some("INVALID_MERKLE_ROOT")
    );
    let header = record.block_header.expect("partial header still present");
    assert!(!header.merkle_root_valid);
    assert!(record.transactions.is_empty());
}

#[test]
fn missing_undo_record_reports_undo_not_found() {
    let txs = [coinbase_tx(), spend_tx()];
    let txids: Vec<[u8; 32]> = txs
        .iter()
        .map(|tx| double_sha256(&serialize_stripped(tx)))
        .collect();
    let blk = build_blk(&txs, merkle_root(&txids));

    // Rev file only contains the ghost record.
    let mut ghost_payload = Vec::new();
    write_compact_size(&mut ghost_payload, 4);
    for _ in 0..4 {
        write_compact_size(&mut ghost_payload, 1);
        ghost_payload.extend_from_slice(&txin_undo_p2pkh(839_000, 1_234, 0x55));
    }
    let rev = frame_undo_record(&ghost_payload);

    let dir = tempfile::tempdir().unwrap();
    let (blk_path, rev_path, xor_path) = write_triple(dir.path(), &blk, &rev);
    let record = analyze_block_files(&blk_path, &rev_path, Some(&xor_path)).unwrap();

    assert!(!record.ok);
    assert_eq!(
        record.error.as_ref().map(|err| err.code.as_str()),
        Some("UNDO_NOT_FOUND")
    );
}

#[test]
fn absent_xor_key_means_plain_files() {
    let txs = [coinbase_tx(), spend_tx()];
    let txids: Vec<[u8; 32]> = txs
        .iter()
        .map(|tx| double_sha256(&serialize_stripped(tx)))
        .collect();
    let blk = build_blk(&txs, merkle_root(&txids));
    let rev = build_rev();

    let dir = tempfile::tempdir().unwrap();
    let blk_path = dir.path().join("blk00000.dat");
    let rev_path = dir.path().join("rev00000.dat");
    fs::write(&blk_path, &blk).unwrap();
    fs::write(&rev_path, &rev).unwrap();

    let record = analyze_block_files(&blk_path, &rev_path, None).unwrap();
    assert!(record.ok, "error: {:?}", record.error);
}
