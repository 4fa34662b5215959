//! Core library for **Blockscope** — a Bitcoin block and transaction
//! analyzer.
//!
//! Given a raw transaction plus its previous outputs, or an on-disk
//! block file paired with its undo (rev) file, this crate produces a
//! fully classified description of every transaction, input, output,
//! script, amount, fee, and block-level statistic. It is intentionally
//! synchronous and stateless: each analysis call reads its inputs,
//! computes, and returns, holding no process-wide mutable state.

pub mod address;
pub mod block;
pub mod codec;
pub mod error;
pub mod fixture;
pub mod opcodes;
pub mod script;
pub mod timelock;
pub mod tx;
pub mod types;
pub mod undo;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::CoreError;
pub use fixture::TxFixture;
pub use types::{BlockRecord, ErrorRecord, TxRecord};
