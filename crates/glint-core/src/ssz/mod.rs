//! The SSZ codec: definitions, random access, hash-tree-root, and
//! multi-proof construction/verification (§4.1).
//!
//! The layer is deliberately *definition-driven*: `SszDef` is a runtime
//! tagged variant, not a Rust type per shape. §9's design note is explicit
//! that definitions may be produced at runtime from a fork id, so the
//! temptation to generate per-type code (a derive macro, a trait per
//! container) is avoided — one small set of algorithms walks whatever
//! `SszDef` it is handed.

mod def;
mod fork;
mod gindex;
mod merkle;
mod multiproof;
mod object;

pub use def::{FieldDef, SszDef};
pub use fork::Fork;
pub use gindex::Gindex;
pub use merkle::hash_tree_root;
pub use multiproof::{create_multi_proof, verify_multi_proof};
pub use object::SszObject;

use thiserror::Error;

/// Failures raised while validating, navigating, or Merkleizing SSZ wire
/// data. These map into `CoreError::InvalidWire` / `InvalidMerkleProof` at
/// the boundary the verifier pipeline sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SszError {
    #[error("truncated input: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("variable-size offset out of range: {offset} (buffer length {len})")]
    OffsetOutOfRange { offset: u32, len: usize },

    #[error("variable-size offsets are not monotonically non-decreasing")]
    OffsetsNotMonotonic,

    #[error("first variable-size offset {first} does not equal fixed-part length {fixed_len}")]
    FirstOffsetMismatch { first: u32, fixed_len: usize },

    #[error("list length {len} exceeds max_length {max}")]
    ListTooLong { len: usize, max: usize },

    #[error("bit-list is missing its sentinel bit")]
    MissingSentinelBit,

    #[error("unknown union selector {0}")]
    UnknownUnionSelector(u8),

    #[error("field '{0}' not found in container definition")]
    UnknownField(String),

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("operation not valid for this definition: {0}")]
    WrongDefKind(&'static str),

    #[error("invalid generalized index composition")]
    InvalidGindex,

    #[error("multi-proof is missing a witness for gindex {0}")]
    MissingWitness(u64),

    #[error("multi-proof verification produced root {computed}, expected {expected}")]
    RootMismatch { computed: String, expected: String },

    #[error("no gindex lookup registered for fork {fork:?} field '{field}'")]
    UnknownForkGindex { fork: Fork, field: &'static str },
}
