//! Output record types: the structured description of an analyzed
//! transaction or block.
//!
//! These are the language-neutral records consumers render (the CLI
//! serializes them to JSON verbatim). Hash fields use the `bitcoin`
//! crate's hash types, whose serde form is the display-reversed 64-char
//! lowercase hex convention; satoshi amounts serialize as integers.

use std::collections::BTreeMap;

use bitcoin::{Amount, BlockHash, Txid, Wtxid};
use serde::Serialize;

use crate::error::CoreError;
use crate::script::{OpReturnProtocol, ScriptType};
use crate::timelock::{LocktimeType, RelativeTimelock};

// ==============================================================================
// Transaction records
// ==============================================================================

/// A fully analyzed transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TxRecord {
    pub txid: Txid,
    /// Present only for SegWit transactions; for legacy transactions the
    /// wtxid would equal the txid and is omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wtxid: Option<Wtxid>,
    pub version: i32,
    pub locktime: u32,
    pub locktime_type: LocktimeType,
    pub segwit: bool,
    pub size_bytes: u64,
    pub weight: u64,
    pub vbytes: u64,
    pub total_input_sats: u64,
    pub total_output_sats: u64,
    /// `total_input_sats - total_output_sats`; zero for coinbase, where
    /// no prevouts exist and a fee is meaningless.
    pub fee_sats: i64,
    pub fee_rate_sat_vb: f64,
    pub rbf_signaling: bool,
    pub vin: Vec<InputRecord>,
    pub vout: Vec<OutputRecord>,
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segwit_savings: Option<SegwitSavings>,
}

/// One analyzed transaction input.
#[derive(Debug, Clone, Serialize)]
pub struct InputRecord {
    pub prev_txid: Txid,
    pub prev_vout: u32,
    pub sequence: u32,
    pub script_sig_hex: String,
    pub script_sig_asm: String,
    /// Witness stack items as hex; empty items are preserved as empty
    /// strings.
    pub witness: Vec<String>,
    /// Disassembly of the witnessScript (the last witness item), present
    /// only for p2wsh and p2sh-p2wsh spends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness_script_asm: Option<String>,
    pub script_type: ScriptType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// The spent output. `None` for coinbase inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prevout: Option<PrevoutRecord>,
    pub relative_timelock: RelativeTimelock,
}

/// The resolved output an input spends.
#[derive(Debug, Clone, Serialize)]
pub struct PrevoutRecord {
    pub value_sats: Amount,
    pub script_pubkey_hex: String,
}

/// One analyzed transaction output.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    /// Output index; always equal to the position in `vout`.
    pub n: u32,
    pub value_sats: Amount,
    pub script_pubkey_hex: String,
    pub script_pubkey_asm: String,
    pub script_type: ScriptType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_data_hex: Option<String>,
    /// Present only when the OP_RETURN payload decodes as UTF-8 without
    /// replacement characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_data_utf8: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_return_protocol: Option<OpReturnProtocol>,
}

/// Byte/weight accounting for what SegWit saved this transaction.
#[derive(Debug, Clone, Serialize)]
pub struct SegwitSavings {
    pub witness_bytes: u64,
    pub non_witness_bytes: u64,
    pub total_bytes: u64,
    pub weight_actual: u64,
    /// What the weight would be if all bytes were counted at the legacy
    /// rate (total size × 4).
    pub weight_if_legacy: u64,
    pub savings_pct: f64,
}

// ==============================================================================
// Warnings
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    HighFee,
    DustOutput,
    UnknownOutputScript,
    RbfSignaling,
}

/// A single warning entry, wrapped in an object so renderers can attach
/// per-warning detail later without a format break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub code: WarningCode,
}

impl Warning {
    pub fn new(code: WarningCode) -> Self {
        Self { code }
    }
}

// ==============================================================================
// Block records
// ==============================================================================

/// The top-level result of a block analysis.
///
/// `ok` is false when the analysis stopped at a data-consistency failure;
/// the header (and whatever else was decoded before the failure) is still
/// populated so callers can identify the block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockRecord {
    pub ok: bool,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_header: Option<BlockHeaderRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coinbase: Option<CoinbaseRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<TxRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_stats: Option<BlockStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

/// The decoded 80-byte block header.
#[derive(Debug, Clone, Serialize)]
pub struct BlockHeaderRecord {
    pub hash: BlockHash,
    pub version: i32,
    pub prev_hash: BlockHash,
    /// The merkle root as claimed by the header.
    pub merkle_root: Txid,
    pub merkle_root_valid: bool,
    pub timestamp: u32,
    /// Compact difficulty target, rendered as 8 lowercase hex chars.
    pub bits: String,
    pub nonce: u32,
}

/// Summary of the block's coinbase transaction.
#[derive(Debug, Clone, Serialize)]
pub struct CoinbaseRecord {
    /// Height decoded from the BIP34 push at the start of the coinbase
    /// scriptSig; zero when malformed or absent.
    pub bip34_height: u64,
    pub script_sig_hex: String,
    pub total_output_sats: u64,
}

/// Aggregate statistics over every transaction in the block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockStats {
    /// Sum of fees across non-coinbase transactions.
    pub total_fees_sats: i64,
    pub total_weight: u64,
    pub avg_fee_rate_sat_vb: f64,
    /// Output count per script type, across all transactions.
    pub script_type_summary: BTreeMap<ScriptType, u64>,
}

// ==============================================================================
// Error record
// ==============================================================================

/// The `{code, message}` payload of a failed analysis.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&CoreError> for ErrorRecord {
    fn from(err: &CoreError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}
