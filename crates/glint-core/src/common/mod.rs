//! Byte and buffer primitives underlying the SSZ and MPT layers (§3).
//!
//! `alloy_primitives::{B256, Address}` already give us the fixed-width
//! `bytes32`/`address` aliases the spec asks for, so this module only adds
//! what the pack doesn't already carry: a borrowed byte view and an owned
//! buffer with the tri-state allocation policy described in §3.

mod buffer;
mod bytes_view;

pub use buffer::{Allocated, Buffer};
pub use bytes_view::ByteView;

/// A 32-byte hash / root, re-exported from `alloy_primitives` rather than
/// reinvented.
pub type Bytes32 = alloy_primitives::B256;

/// A 20-byte Ethereum address, re-exported from `alloy_primitives`.
pub type Address = alloy_primitives::Address;
