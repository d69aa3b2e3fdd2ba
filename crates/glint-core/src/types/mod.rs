//! Wire/data types shared across the sync-committee manager, the verifier
//! pipeline, and the MPT layer (§3).

pub mod beacon;
pub mod execution;
