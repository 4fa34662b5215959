//! Caller-supplied transaction fixtures and prevout resolution.
//!
//! A fixture is the transaction-mode input: a network tag, the raw
//! transaction hex, and the outputs its inputs spend. Block mode builds
//! the same prevout set from undo data instead.

use std::collections::HashMap;

use bitcoin::{Amount, Network, OutPoint, Txid};
use serde::Deserialize;

use crate::error::CoreError;

// ==============================================================================
// Fixture input records
// ==============================================================================

/// Network selector for address encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkTag {
    Mainnet,
    Testnet,
}

impl NetworkTag {
    pub fn to_network(self) -> Network {
        match self {
            Self::Mainnet => Network::Bitcoin,
            Self::Testnet => Network::Testnet,
        }
    }
}

/// The transaction-mode input record. Unrecognized fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TxFixture {
    pub network: NetworkTag,
    /// Lowercase hex of the consensus-serialized transaction.
    pub raw_tx: String,
    #[serde(default)]
    pub prevouts: Vec<FixturePrevout>,
}

/// One spent output, keyed by the outpoint it funds.
#[derive(Debug, Clone, Deserialize)]
pub struct FixturePrevout {
    pub txid: Txid,
    pub vout: u32,
    pub value_sats: Amount,
    pub script_pubkey_hex: String,
}

// ==============================================================================
// Prevout resolution
// ==============================================================================

/// A resolved spent output: the value and script an input consumes.
#[derive(Debug, Clone)]
pub struct ResolvedPrevout {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
}

/// An outpoint-keyed index of resolved prevouts.
///
/// Every non-coinbase input of the transaction under analysis must
/// resolve through this set; duplicate outpoints are rejected at
/// construction.
#[derive(Debug, Default)]
pub struct PrevoutSet {
    by_outpoint: HashMap<OutPoint, ResolvedPrevout>,
}

impl PrevoutSet {
    /// Build the index from fixture prevout records.
    pub fn from_fixture(prevouts: &[FixturePrevout]) -> Result<Self, CoreError> {
        let mut set = Self::default();
        for prevout in prevouts {
            let script_pubkey =
                hex::decode(&prevout.script_pubkey_hex).map_err(|source| CoreError::InvalidHex {
                    field: "prevout script_pubkey_hex",
                    source,
                })?;
            set.insert(
                OutPoint::new(prevout.txid, prevout.vout),
                ResolvedPrevout {
                    value: prevout.value_sats,
                    script_pubkey,
                },
            )?;
        }
        Ok(set)
    }

    /// Insert a resolved prevout, rejecting duplicate outpoints.
    pub fn insert(&mut self, outpoint: OutPoint, prevout: ResolvedPrevout) -> Result<(), CoreError> {
        if self.by_outpoint.insert(outpoint, prevout).is_some() {
            return Err(CoreError::DuplicatePrevout {
                txid: outpoint.txid,
                vout: outpoint.vout,
            });
        }
        Ok(())
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&ResolvedPrevout> {
        self.by_outpoint.get(outpoint)
    }

    pub fn len(&self) -> usize {
        self.by_outpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_outpoint.is_empty()
    }
}
