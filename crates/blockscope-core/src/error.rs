//! Error types for blockscope-core.

use std::path::PathBuf;

use bitcoin::Txid;

/// Top-level error type for the blockscope-core crate.
///
/// Each variant captures a specific failure mode rather than collapsing
/// everything into a single `String`. Every variant maps onto exactly one
/// of the stable error-code strings surfaced in output records (see
/// [`CoreError::code`]), so callers can render `{code, message}` pairs
/// without string matching.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid fixture: {0}")]
    InvalidFixture(String),

    #[error("invalid hex in {field}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    /// The underlying byte stream ended (or was malformed) mid-value.
    #[error("truncated or malformed data while reading {0}")]
    Truncated(&'static str),

    #[error("no prevout supplied for input {txid}:{vout}")]
    MissingPrevout { txid: Txid, vout: u32 },

    #[error("duplicate prevout for {txid}:{vout}")]
    DuplicatePrevout { txid: Txid, vout: u32 },

    #[error("recomputed merkle root does not match the block header")]
    InvalidMerkleRoot,

    #[error("no undo record with {expected} spent-output groups before end of rev file")]
    UndoNotFound { expected: u64 },

    #[error("invalid undo data: {0}")]
    InvalidUndoData(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// The stable error-code string for this failure, as rendered in
    /// `{ok: false, error: {code, message}}` records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFixture(_) => "INVALID_FIXTURE",
            Self::InvalidHex { .. } => "INVALID_HEX",
            Self::Truncated(_) => "TRUNCATED",
            Self::MissingPrevout { .. } => "MISSING_PREVOUT",
            Self::DuplicatePrevout { .. } => "DUPLICATE_PREVOUT",
            Self::InvalidMerkleRoot => "INVALID_MERKLE_ROOT",
            Self::UndoNotFound { .. } => "UNDO_NOT_FOUND",
            Self::InvalidUndoData(_) => "INVALID_UNDO_DATA",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::Io(_) => "IO_ERROR",
        }
    }
}
