//! Merkle-Patricia trie verification and construction (§4.2).
//!
//! Generalizes the teacher's `execution/proof.rs` — which only ever walks
//! a caller-supplied proof against a known root — into a module that can
//! also build a trie from scratch (`Trie::insert`) and re-derive a proof's
//! node list, while replacing its hand-rolled RLP decoder
//! (`decode_rlp_list`/`decode_rlp_item`/...) with `alloy_rlp`, a dependency
//! the teacher already declared but never called from this file.

mod keyed;
mod nibbles;
mod node;
pub mod rlp_codec;
mod trie;

pub use keyed::{receipt_key, state_key, storage_key, tx_key};
pub use nibbles::bytes_to_nibbles;
pub use node::{keccak256, NodeRef, TrieNode};
pub use trie::Trie;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MptError {
    #[error("empty proof: no trie nodes provided")]
    EmptyProof,

    #[error("malformed RLP encoding in trie node {index}: {reason}")]
    InvalidRlp { index: usize, reason: String },

    #[error("proof root mismatch: computed {computed}, expected {expected}")]
    RootMismatch { computed: String, expected: String },

    #[error("unexpected node shape at depth {depth}: {shape}")]
    UnexpectedNodeShape { depth: usize, shape: String },

    #[error("proof path ended at depth {depth} without reaching the key")]
    IncompleteProof { depth: usize },

    #[error("child hash at depth {depth} does not match the parent's reference")]
    ChildHashMismatch { depth: usize },

    #[error("malformed account RLP: {0}")]
    InvalidAccount(String),

    #[error("malformed receipt RLP: {0}")]
    InvalidReceipt(String),

    #[error("value too long for a 32-byte word: {0} bytes")]
    ValueTooLong(usize),
}
