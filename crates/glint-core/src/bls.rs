//! BLS aggregate signature check over the sync committee (§4.3).
//!
//! Pulled out of the teacher's `consensus::sync_committee::
//! verify_aggregate_bls_signature`, which inlined the threshold and
//! bitmask-length checks into the one call site that needed them. Here
//! those checks are the contract itself, not a side effect of one caller.

use blst::min_pk::{AggregatePublicKey, PublicKey, Signature};
use blst::BLST_ERROR;
use thiserror::Error;

use crate::common::Bytes32;

/// Domain separation tag for Ethereum's min-pubkey-size BLS signature
/// scheme (BLS12-381 G2 signatures, G1 public keys, proof-of-possession
/// variant). Identical across all beacon chain forks.
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlsError {
    #[error("sync committee bits length {got} does not match num_pubkeys/8 = {expected}")]
    BitmaskLengthMismatch { got: usize, expected: usize },

    #[error("insufficient participation: {participants}/{total} (need at least {required})")]
    InsufficientParticipation {
        participants: usize,
        total: usize,
        required: usize,
    },

    #[error("public key at committee index {index} is not a valid curve point: {reason}")]
    InvalidPublicKey { index: usize, reason: String },

    #[error("signature is not a valid curve point: {0}")]
    InvalidSignature(String),

    #[error("failed to aggregate {0} public keys")]
    AggregationFailed(usize),

    #[error("aggregate signature does not verify against the participating committee")]
    VerificationFailed,
}

/// The compressed 48-byte serialization of a committee member's public key,
/// or (per §4.3's performance hint) an already-deserialized curve point —
/// skips repeated deserialization when the sync-period record caches it.
pub enum PubkeySource<'a> {
    Raw(&'a [[u8; 48]]),
    Deserialized(&'a [PublicKey]),
}

impl<'a> PubkeySource<'a> {
    fn len(&self) -> usize {
        match self {
            PubkeySource::Raw(s) => s.len(),
            PubkeySource::Deserialized(s) => s.len(),
        }
    }
}

/// Verify an aggregate BLS signature over `signing_root` from the
/// participating subset of `pubkeys`, as marked by `participation_bits`
/// (one bit per committee member, LSB-first within each byte).
///
/// Fails closed per §4.3: wrong bitmask length, below-threshold
/// participation, or any curve-invalid key are all rejected before the
/// pairing check runs.
pub fn verify(
    signing_root: &Bytes32,
    aggregate_signature: &[u8; 96],
    pubkeys: PubkeySource<'_>,
    participation_bits: &[u8],
) -> Result<(), BlsError> {
    let num_pubkeys = pubkeys.len();
    let expected_bitmask_len = num_pubkeys.div_ceil(8);
    if participation_bits.len() != expected_bitmask_len {
        return Err(BlsError::BitmaskLengthMismatch {
            got: participation_bits.len(),
            expected: expected_bitmask_len,
        });
    }

    let required = num_pubkeys.div_ceil(3) * 2;
    let participant_indices = participating_indices(participation_bits, num_pubkeys);
    if participant_indices.len() < required {
        return Err(BlsError::InsufficientParticipation {
            participants: participant_indices.len(),
            total: num_pubkeys,
            required,
        });
    }

    let participating_keys = deserialize_participants(&pubkeys, &participant_indices)?;

    let sig = Signature::from_bytes(aggregate_signature)
        .map_err(|e| BlsError::InvalidSignature(format!("{e:?}")))?;

    let key_refs: Vec<&PublicKey> = participating_keys.iter().collect();
    let agg = AggregatePublicKey::aggregate(&key_refs, false)
        .map_err(|_| BlsError::AggregationFailed(key_refs.len()))?;
    let agg_pk = agg.to_public_key();

    let result = sig.verify(false, signing_root.as_slice(), DST, &[], &agg_pk, false);
    if result != BLST_ERROR::BLST_SUCCESS {
        return Err(BlsError::VerificationFailed);
    }
    Ok(())
}

fn participating_indices(bits: &[u8], num_pubkeys: usize) -> Vec<usize> {
    (0..num_pubkeys)
        .filter(|&i| {
            let byte = i / 8;
            let bit = i % 8;
            bits.get(byte).is_some_and(|b| (b >> bit) & 1 == 1)
        })
        .collect()
}

fn deserialize_participants(
    pubkeys: &PubkeySource<'_>,
    indices: &[usize],
) -> Result<Vec<PublicKey>, BlsError> {
    match pubkeys {
        PubkeySource::Deserialized(keys) => Ok(indices.iter().map(|&i| keys[i]).collect()),
        PubkeySource::Raw(keys) => indices
            .iter()
            .map(|&i| {
                PublicKey::from_bytes(&keys[i]).map_err(|e| BlsError::InvalidPublicKey {
                    index: i,
                    reason: format!("{e:?}"),
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_length_mismatch_is_rejected_before_curve_work() {
        let root = Bytes32::ZERO;
        let sig = [0u8; 96];
        let pubkeys = vec![[0u8; 48]; 512];
        let bits = vec![0u8; 63]; // should be 64
        let err = verify(&root, &sig, PubkeySource::Raw(&pubkeys), &bits).unwrap_err();
        assert!(matches!(err, BlsError::BitmaskLengthMismatch { got: 63, expected: 64 }));
    }

    #[test]
    fn below_threshold_participation_is_rejected() {
        let root = Bytes32::ZERO;
        let sig = [0u8; 96];
        let pubkeys = vec![[0u8; 48]; 512];
        let mut bits = vec![0u8; 64];
        bits[0] = 0xFF; // only 8 participants, need 342
        let err = verify(&root, &sig, PubkeySource::Raw(&pubkeys), &bits).unwrap_err();
        assert!(matches!(err, BlsError::InsufficientParticipation { participants: 8, .. }));
    }

    #[test]
    fn threshold_is_two_thirds_rounded_up() {
        // 512 * 2 / 3 = 341.33 -> 342 required, matching spec's literal example.
        let required = 512usize.div_ceil(3) * 2;
        assert_eq!(required, 342);
    }
}
