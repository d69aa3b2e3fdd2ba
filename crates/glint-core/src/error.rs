//! The error taxonomy shared across every verification layer.
//!
//! Each layer (`ssz`, `mpt`, `bls`, `sync_committee`, `verifier`) defines its
//! own `thiserror` enum for the failures specific to that layer, then maps
//! into `CoreError` at the boundary the executor and verifier pipeline see.
//! `CoreError::Pending` is not a failure — §7 of the spec calls it out
//! explicitly as "not an error; indicates outstanding fetches" — but it is
//! represented here because stage functions return it through the same
//! `Result` as genuine failures so the executor can match on one type.

use thiserror::Error;

use crate::bls::BlsError;
use crate::mpt::MptError;
use crate::ssz::SszError;
use crate::sync_committee::SyncCommitteeError;

/// The top-level error surface. Stage functions in the verifier pipeline and
/// sync-committee manager return `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid wire format: {0}")]
    InvalidWire(String),

    #[error(transparent)]
    InvalidMerkleProof(#[from] SszError),

    #[error(transparent)]
    InvalidMptProof(#[from] MptError),

    #[error("insufficient sync committee participation: {participants}/{total} (need {required})")]
    InsufficientParticipation {
        participants: usize,
        total: usize,
        required: usize,
    },

    #[error(transparent)]
    BadSignature(#[from] BlsError),

    #[error("weak subjectivity check failed: {0}")]
    WeakSubjectivityViolated(String),

    #[error("state root mismatch: proof claims {claimed}, verified root is {verified}")]
    StateRootMismatch { claimed: String, verified: String },

    /// Not a failure: a stage suspended because it is waiting on one or more
    /// external fetches registered on `VerifyState`. The executor treats
    /// this distinctly from every other variant (§7).
    #[error("pending: waiting on outstanding data requests")]
    Pending,

    #[error("upstream fetch failed: {0}")]
    Upstream(String),

    #[error("unsupported method: {0}")]
    Unsupported(String),

    #[error(transparent)]
    SyncCommittee(#[from] SyncCommitteeError),
}

impl CoreError {
    /// True for errors the outer transport may legitimately retry by
    /// reissuing the offending data request against a different upstream
    /// (§4.6 "Retries").
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Upstream(_))
    }

    /// True for `CoreError::Pending` — used by the executor to distinguish
    /// suspension from termination without a second enum.
    pub fn is_pending(&self) -> bool {
        matches!(self, CoreError::Pending)
    }
}
