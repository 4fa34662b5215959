//! Locktime interpretation: absolute locktime, BIP68 relative locks, and
//! BIP125 replace-by-fee signaling.

use serde::{Deserialize, Serialize};

// ==============================================================================
// Absolute locktime
// ==============================================================================

/// How a transaction's `nLockTime` field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocktimeType {
    None,
    BlockHeight,
    UnixTimestamp,
}

/// The consensus threshold below which a locktime is a block height.
const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Classify an absolute locktime value.
pub fn classify_locktime(locktime: u32) -> LocktimeType {
    if locktime == 0 {
        LocktimeType::None
    } else if locktime < LOCKTIME_THRESHOLD {
        LocktimeType::BlockHeight
    } else {
        LocktimeType::UnixTimestamp
    }
}

// ==============================================================================
// BIP68 relative timelock
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeLockKind {
    Blocks,
    Time,
}

/// A decoded BIP68 relative timelock for one input's sequence field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeTimelock {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RelativeLockKind>,
    /// Blocks, or seconds (already multiplied out from 512s units).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
}

impl RelativeTimelock {
    const DISABLED: Self = Self {
        enabled: false,
        kind: None,
        value: None,
    };
}

const SEQUENCE_DISABLE_FLAG: u32 = 1 << 31;
const SEQUENCE_TYPE_FLAG: u32 = 1 << 22;
const SEQUENCE_VALUE_MASK: u32 = 0xFFFF;

/// Decode the BIP68 relative timelock encoded in an input's sequence.
pub fn decode_relative_timelock(sequence: u32) -> RelativeTimelock {
    if sequence & SEQUENCE_DISABLE_FLAG != 0 || sequence >= 0xFFFF_FFFE {
        return RelativeTimelock::DISABLED;
    }
    let masked = u64::from(sequence & SEQUENCE_VALUE_MASK);
    if sequence & SEQUENCE_TYPE_FLAG != 0 {
        RelativeTimelock {
            enabled: true,
            kind: Some(RelativeLockKind::Time),
            value: Some(masked * 512),
        }
    } else {
        RelativeTimelock {
            enabled: true,
            kind: Some(RelativeLockKind::Blocks),
            value: Some(masked),
        }
    }
}

// ==============================================================================
// BIP125 RBF
// ==============================================================================

/// A transaction signals opt-in replace-by-fee if any input has a
/// sequence number below `0xFFFFFFFE`.
pub fn is_rbf_signaling(sequences: impl IntoIterator<Item = u32>) -> bool {
    sequences.into_iter().any(|sequence| sequence < 0xFFFF_FFFE)
}

// ==============================================================================
// Tests
// ==============================================================================
