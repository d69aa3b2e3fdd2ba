//! # glint-core
//!
//! A stateless Ethereum (and op-stack) light-client proof engine.
//!
//! This crate contains **no networking code**, **no persistence
//! implementation**, and **no EVM**. It is the verification heart of a
//! light client: proof bytes and a trusted sync-committee state go in,
//! a verified result or a precise error comes out.
//!
//! ## Trust model
//!
//! - **Sync-committee verification** ([`bls`], [`sync_committee`]): trusts
//!   that 2/3+ of the 512-member committee is honest, the same assumption
//!   Ethereum itself makes.
//! - **Execution-layer verification** ([`mpt`]): zero trust assumptions
//!   beyond the state root the sync-committee layer already verified.
//! - **Wire codec** ([`ssz`]): no trust assumptions — structural validity
//!   and Merkleization only.
//!
//! ## Layering
//!
//! ```text
//! common → ssz ┬→ bls ┬→ sync_committee ┬→ verifier → executor
//!           mpt ┘      ┘                 ┘
//! ```

pub mod bls;
pub mod common;
pub mod config;
pub mod error;
pub mod executor;
pub mod mpt;
pub mod ssz;
pub mod sync_committee;
pub mod types;
pub mod verifier;

pub use common::{Address, Bytes32};
pub use config::CoreConfig;
pub use error::CoreError;
pub use executor::{resume, DataRequest, VerifyCtx, VerifyState};
pub use sync_committee::{StoragePlugin, SyncCommitteeError, SyncCommitteeManager};
pub use verifier::{C4Request, MethodClass};
