//! Script classification and disassembly.
//!
//! Output scripts are classified by exact byte templates (length first,
//! then pattern); input scripts are classified from the scriptSig/witness
//! shape cross-referenced with the spent output's type. Classification is
//! a closed enum over byte templates — no script execution, no dynamic
//! dispatch.

use serde::{Deserialize, Serialize};

use crate::opcodes::opcode_name;

// ==============================================================================
// Script Type Classification
// ==============================================================================

/// The closed set of script shapes the analyzer distinguishes.
///
/// Output classification produces the first six variants (plus `Unknown`);
/// input classification additionally produces the wrapped-SegWit and
/// taproot spend-path variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    #[serde(rename = "p2pkh")]
    P2pkh,
    #[serde(rename = "p2sh")]
    P2sh,
    #[serde(rename = "p2wpkh")]
    P2wpkh,
    #[serde(rename = "p2wsh")]
    P2wsh,
    #[serde(rename = "p2tr")]
    P2tr,
    #[serde(rename = "op_return")]
    OpReturn,
    #[serde(rename = "p2sh-p2wpkh")]
    P2shP2wpkh,
    #[serde(rename = "p2sh-p2wsh")]
    P2shP2wsh,
    #[serde(rename = "p2tr_keypath")]
    P2trKeypath,
    #[serde(rename = "p2tr_scriptpath")]
    P2trScriptpath,
    #[serde(rename = "unknown")]
    Unknown,
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::P2pkh => "p2pkh",
            Self::P2sh => "p2sh",
            Self::P2wpkh => "p2wpkh",
            Self::P2wsh => "p2wsh",
            Self::P2tr => "p2tr",
            Self::OpReturn => "op_return",
            Self::P2shP2wpkh => "p2sh-p2wpkh",
            Self::P2shP2wsh => "p2sh-p2wsh",
            Self::P2trKeypath => "p2tr_keypath",
            Self::P2trScriptpath => "p2tr_scriptpath",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify an output script (scriptPubKey) by its byte template.
pub fn classify_output(script: &[u8]) -> ScriptType {
    // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    if script.len() == 25
        && script[0] == 0x76
        && script[1] == 0xA9
        && script[2] == 0x14
        && script[23] == 0x88
        && script[24] == 0xAC
    {
        ScriptType::P2pkh
    // OP_HASH160 <20> OP_EQUAL
    } else if script.len() == 23 && script[0] == 0xA9 && script[1] == 0x14 && script[22] == 0x87 {
        ScriptType::P2sh
    } else if script.len() == 22 && script[0] == 0x00 && script[1] == 0x14 {
        ScriptType::P2wpkh
    } else if script.len() == 34 && script[0] == 0x00 && script[1] == 0x20 {
        ScriptType::P2wsh
    } else if script.len() == 34 && script[0] == 0x51 && script[1] == 0x20 {
        ScriptType::P2tr
    } else if script.first() == Some(&0x6A) {
        ScriptType::OpReturn
    } else {
        ScriptType::Unknown
    }
}

/// Classify an input from its scriptSig, witness stack, and the type of
/// the output it spends.
///
/// Legacy inputs with both an empty scriptSig and an empty witness fall
/// back to the prevout's type when that type is p2pkh or p2sh; there is
/// no consensus-level marker to distinguish them.
pub fn classify_input(script_sig: &[u8], witness: &[Vec<u8>], prevout_type: ScriptType) -> ScriptType {
    if script_sig.is_empty() {
        if witness.is_empty() {
            return match prevout_type {
                ScriptType::P2pkh | ScriptType::P2sh => prevout_type,
                _ => ScriptType::Unknown,
            };
        }
        if prevout_type == ScriptType::P2tr {
            if witness.len() == 1 && matches!(witness[0].len(), 64 | 65) {
                return ScriptType::P2trKeypath;
            }
            // Script-path spends end with a control block whose leading
            // byte is 0xc0/0xc1 (the low bit is the output parity).
            if witness.len() >= 2 {
                if let Some(&first) = witness.last().and_then(|item| item.first()) {
                    if first & 0xFE == 0xC0 {
                        return ScriptType::P2trScriptpath;
                    }
                }
            }
            return ScriptType::Unknown;
        }
        if prevout_type == ScriptType::P2wpkh && witness.len() == 2 {
            return ScriptType::P2wpkh;
        }
        if prevout_type == ScriptType::P2wsh {
            return ScriptType::P2wsh;
        }
        return ScriptType::Unknown;
    }

    // Wrapped SegWit: the scriptSig is a single push of the witness program.
    if script_sig.len() == 23 && script_sig.starts_with(&[0x16, 0x00, 0x14]) && witness.len() == 2 {
        return ScriptType::P2shP2wpkh;
    }
    if script_sig.len() == 35 && script_sig.starts_with(&[0x22, 0x00, 0x20]) && !witness.is_empty() {
        return ScriptType::P2shP2wsh;
    }
    if witness.is_empty() && prevout_type == ScriptType::P2pkh {
        return ScriptType::P2pkh;
    }
    ScriptType::Unknown
}

// ==============================================================================
// Disassembly
// ==============================================================================

/// Disassemble a script into canonical space-separated ASM.
///
/// Pushes render as `OP_PUSHBYTES_<n> <hex>` / `OP_PUSHDATA<k> <hex>`.
/// A push whose payload (or length prefix) runs past the end of the
/// script emits the opcode name alone and stops. Unassigned opcodes
/// render as `OP_UNKNOWN_0x<nn>`.
pub fn disassemble(script: &[u8]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < script.len() {
        let op = script[i];
        i += 1;
        match op {
            0x01..=0x4B => {
                let n = op as usize;
                if script.len() - i < n {
                    parts.push(format!("OP_PUSHBYTES_{n}"));
                    break;
                }
                parts.push(format!("OP_PUSHBYTES_{n} {}", hex::encode(&script[i..i + n])));
                i += n;
            }
            0x4C | 0x4D | 0x4E => {
                let name = match op {
                    0x4C => "OP_PUSHDATA1",
                    0x4D => "OP_PUSHDATA2",
                    _ => "OP_PUSHDATA4",
                };
                let Some((n, next)) = read_push_length(script, i, op) else {
                    parts.push(name.to_string());
                    break;
                };
                i = next;
                if script.len() - i < n {
                    parts.push(name.to_string());
                    break;
                }
                if n == 0 {
                    parts.push(name.to_string());
                } else {
                    parts.push(format!("{name} {}", hex::encode(&script[i..i + n])));
                }
                i += n;
            }
            _ => match opcode_name(op) {
                Some(name) => parts.push(name.to_string()),
                None => parts.push(format!("OP_UNKNOWN_0x{op:02x}")),
            },
        }
    }
    parts.join(" ")
}

/// Decode the 1/2/4-byte little-endian length of a PUSHDATA opcode.
/// Returns the payload length and the offset just past the length field,
/// or `None` if the length field itself is truncated.
fn read_push_length(script: &[u8], at: usize, op: u8) -> Option<(usize, usize)> {
    let width = 1usize << (op - 0x4C); // 1, 2, or 4 bytes
    if script.len() - at < width {
        return None;
    }
    let mut n = 0usize;
    for (k, &b) in script[at..at + width].iter().enumerate() {
        n |= (b as usize) << (8 * k);
    }
    Some((n, at + width))
}

// ==============================================================================
// OP_RETURN extraction
// ==============================================================================

/// Well-known protocol tags recognized in OP_RETURN payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpReturnProtocol {
    Omni,
    Opentimestamps,
    Unknown,
}

/// The decoded payload of an OP_RETURN output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReturnData {
    /// All pushed payloads, concatenated, as hex.
    pub data_hex: String,
    /// UTF-8 decoding of the payload. Present only when the bytes are
    /// valid UTF-8 containing no U+FFFD replacement character; lossy
    /// output is never exposed.
    pub data_utf8: Option<String>,
    pub protocol: OpReturnProtocol,
}

const OMNI_PREFIX: [u8; 4] = [0x6F, 0x6D, 0x6E, 0x69]; // "omni"
const OPENTIMESTAMPS_PREFIX: [u8; 5] = [0x01, 0x09, 0xF9, 0x11, 0x02];

/// Extract the data payload of an OP_RETURN script.
///
/// The leading OP_RETURN byte is stripped; successive push opcodes
/// (direct and PUSHDATA1/2/4) are decoded and their payloads
/// concatenated. Decoding stops at the first non-push opcode or
/// truncated push.
pub fn extract_op_return(script: &[u8]) -> OpReturnData {
    let mut payload: Vec<u8> = Vec::new();
    let mut i = usize::from(script.first() == Some(&0x6A));
    while i < script.len() {
        let op = script[i];
        i += 1;
        let n = match op {
            0x01..=0x4B => op as usize,
            0x4C..=0x4E => match read_push_length(script, i, op) {
                Some((n, next)) => {
                    i = next;
                    n
                }
                None => break,
            },
            _ => break,
        };
        if script.len() - i < n {
            break;
        }
        payload.extend_from_slice(&script[i..i + n]);
        i += n;
    }

    let data_utf8 = match std::str::from_utf8(&payload) {
        Ok(s) if !s.contains('\u{FFFD}') => Some(s.to_owned()),
        _ => None,
    };
    let protocol = if payload.starts_with(&OMNI_PREFIX) {
        OpReturnProtocol::Omni
    } else if payload.starts_with(&OPENTIMESTAMPS_PREFIX) {
        OpReturnProtocol::Opentimestamps
    } else {
        OpReturnProtocol::Unknown
    };

    OpReturnData {
        data_hex: hex::encode(&payload),
        data_utf8,
        protocol,
    }
}

// ==============================================================================
// Tests
// ==============================================================================
