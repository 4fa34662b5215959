//! Transaction analysis: parse, classify, measure, and assemble the full
//! per-transaction record.

use bitcoin::hashes::Hash;
use bitcoin::{Amount, Network, OutPoint, Txid, Wtxid};

use crate::address::derive_address;
use crate::codec::{double_sha256, ByteReader};
use crate::error::CoreError;
use crate::fixture::{PrevoutSet, TxFixture};
use crate::script::{classify_input, classify_output, disassemble, extract_op_return, ScriptType};
use crate::timelock::{classify_locktime, decode_relative_timelock, is_rbf_signaling};
use crate::types::{
    InputRecord, OutputRecord, PrevoutRecord, SegwitSavings, TxRecord, Warning, WarningCode,
};
use crate::wire::{decode_transaction, serialize_full, serialize_stripped, RawTransaction};

// ==============================================================================
// Warning thresholds
// ==============================================================================

/// Absolute fee above which HIGH_FEE fires, in satoshis.
const HIGH_FEE_SATS: i64 = 1_000_000;

/// Fee rate above which HIGH_FEE fires, in sat/vB.
const HIGH_FEE_RATE_SAT_VB: f64 = 200.0;

/// Outputs below this value are dust (the standardness floor for P2PKH).
const DUST_THRESHOLD_SATS: u64 = 546;

// ==============================================================================
// Entry points
// ==============================================================================

/// Analyze a caller-supplied fixture: decode the raw transaction hex and
/// resolve its inputs against the supplied prevouts.
pub fn analyze_fixture(fixture: &TxFixture) -> Result<TxRecord, CoreError> {
    let raw = hex::decode(fixture.raw_tx.trim()).map_err(|source| CoreError::InvalidHex {
        field: "raw_tx",
        source,
    })?;
    let mut reader = ByteReader::new(&raw, "transaction");
    let tx = decode_transaction(&mut reader)?;
    let prevouts = PrevoutSet::from_fixture(&fixture.prevouts)?;
    analyze_transaction(&tx, &prevouts, fixture.network.to_network())
}

/// Analyze an already-decoded transaction against a prevout set.
///
/// This is the shared core of fixture mode and block mode; block mode
/// supplies prevouts reconstructed from undo data instead of fixture
/// records. Every non-coinbase input must resolve or the whole analysis
/// fails with `MISSING_PREVOUT`.
pub fn analyze_transaction(
    tx: &RawTransaction,
    prevouts: &PrevoutSet,
    network: Network,
) -> Result<TxRecord, CoreError> {
    let segwit = tx.has_witness();

    // Sizes and ids come from the two canonical encodings. The stripped
    // form hashes to the txid; the full form to the wtxid.
    let stripped = serialize_stripped(tx);
    let full = serialize_full(tx);
    let txid = Txid::from_byte_array(double_sha256(&stripped));
    let wtxid = segwit.then(|| Wtxid::from_byte_array(double_sha256(&full)));

    let base_size = stripped.len() as u64;
    let total_size = full.len() as u64;
    let weight = base_size * 3 + total_size;
    let vbytes = weight.div_ceil(4);

    let is_coinbase = tx.is_coinbase();

    let mut vin = Vec::with_capacity(tx.inputs.len());
    let mut total_in: u64 = 0;
    for input in &tx.inputs {
        let resolved = if input.is_coinbase() {
            None
        } else {
            let outpoint = OutPoint::new(input.prev_txid, input.prev_vout);
            let prevout = prevouts.get(&outpoint).ok_or(CoreError::MissingPrevout {
                txid: outpoint.txid,
                vout: outpoint.vout,
            })?;
            total_in = total_in.saturating_add(prevout.value.to_sat());
            Some(prevout)
        };

        let prevout_type = resolved
            .map(|prevout| classify_output(&prevout.script_pubkey))
            .unwrap_or(ScriptType::Unknown);
        let script_type = classify_input(&input.script_sig, &input.witness, prevout_type);

        // For p2wsh-style spends the last witness item is the
        // witnessScript; surface its disassembly alongside the stack.
        let witness_script_asm = matches!(
            script_type,
            ScriptType::P2wsh | ScriptType::P2shP2wsh
        )
        .then(|| input.witness.last().map(|item| disassemble(item)))
        .flatten();

        vin.push(InputRecord {
            prev_txid: input.prev_txid,
            prev_vout: input.prev_vout,
            sequence: input.sequence,
            script_sig_hex: hex::encode(&input.script_sig),
            script_sig_asm: disassemble(&input.script_sig),
            witness: input.witness.iter().map(hex::encode).collect(),
            witness_script_asm,
            script_type,
            address: resolved
                .and_then(|prevout| derive_address(&prevout.script_pubkey, network)),
            prevout: resolved.map(|prevout| PrevoutRecord {
                value_sats: prevout.value,
                script_pubkey_hex: hex::encode(&prevout.script_pubkey),
            }),
            relative_timelock: decode_relative_timelock(input.sequence),
        });
    }

    let mut vout = Vec::with_capacity(tx.outputs.len());
    let mut total_out: u64 = 0;
    let mut has_dust = false;
    let mut has_unknown_output = false;
    for (n, output) in tx.outputs.iter().enumerate() {
        total_out = total_out.saturating_add(output.value);
        let script_type = classify_output(&output.script_pubkey);

        if script_type == ScriptType::Unknown {
            has_unknown_output = true;
        }
        if script_type != ScriptType::OpReturn && output.value < DUST_THRESHOLD_SATS {
            has_dust = true;
        }

        let op_return = (script_type == ScriptType::OpReturn)
            .then(|| extract_op_return(&output.script_pubkey));

        vout.push(OutputRecord {
            n: n as u32,
            value_sats: Amount::from_sat(output.value),
            script_pubkey_hex: hex::encode(&output.script_pubkey),
            script_pubkey_asm: disassemble(&output.script_pubkey),
            script_type,
            address: derive_address(&output.script_pubkey, network),
            op_return_data_hex: op_return.as_ref().map(|data| data.data_hex.clone()),
            op_return_data_utf8: op_return.as_ref().and_then(|data| data.data_utf8.clone()),
            op_return_protocol: op_return.as_ref().map(|data| data.protocol),
        });
    }

    let fee_sats = if is_coinbase {
        0
    } else {
        total_in as i64 - total_out as i64
    };
    let fee_rate_sat_vb = if is_coinbase || vbytes == 0 {
        0.0
    } else {
        round2(fee_sats as f64 / vbytes as f64)
    };

    let rbf_signaling = is_rbf_signaling(tx.inputs.iter().map(|input| input.sequence));

    // Warning order is fixed and part of the output contract.
    let mut warnings = Vec::new();
    if fee_sats > HIGH_FEE_SATS || fee_rate_sat_vb > HIGH_FEE_RATE_SAT_VB {
        warnings.push(Warning::new(WarningCode::HighFee));
    }
    if has_dust {
        warnings.push(Warning::new(WarningCode::DustOutput));
    }
    if has_unknown_output {
        warnings.push(Warning::new(WarningCode::UnknownOutputScript));
    }
    if rbf_signaling {
        warnings.push(Warning::new(WarningCode::RbfSignaling));
    }

    let segwit_savings = segwit.then(|| {
        let weight_if_legacy = total_size * 4;
        SegwitSavings {
            witness_bytes: total_size - base_size,
            non_witness_bytes: base_size,
            total_bytes: total_size,
            weight_actual: weight,
            weight_if_legacy,
            savings_pct: round2((1.0 - weight as f64 / weight_if_legacy as f64) * 100.0),
        }
    });

    Ok(TxRecord {
        txid,
        wtxid,
        version: tx.version,
        locktime: tx.locktime,
        locktime_type: classify_locktime(tx.locktime),
        segwit,
        size_bytes: total_size,
        weight,
        vbytes,
        total_input_sats: total_in,
        total_output_sats: total_out,
        fee_sats,
        fee_rate_sat_vb,
        rbf_signaling,
        vin,
        vout,
        warnings,
        segwit_savings,
    })
}

/// Round to two decimals for output stability; all internal math stays
/// in full precision.
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ==============================================================================
// Tests
// ==============================================================================
