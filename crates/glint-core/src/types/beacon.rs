//! Beacon-chain wire types shared by the sync-committee manager and the
//! verifier pipeline (§3, §4.4).
//!
//! Hashing goes through the real `ssz` module now — `hash_beacon_block_header`
//! and `hash_sync_committee` build an `SszObject` over the type's actual
//! field layout and call `ssz::hash_tree_root`, rather than a hand-rolled
//! 5-leaf or pubkeys-concatenated stand-in.

use serde::{Deserialize, Serialize};

use crate::common::{Address, Bytes32, ByteView};
use crate::ssz::{self, FieldDef, SszDef, SszObject};

/// Number of validators in the Ethereum beacon chain sync committee.
pub const SYNC_COMMITTEE_SIZE: usize = 512;

/// Number of bytes in a BLS12-381 public key (compressed).
pub const BLS_PUBKEY_LEN: usize = 48;

/// Number of bytes in a BLS12-381 signature (compressed).
pub const BLS_SIGNATURE_LEN: usize = 96;

/// Domain type for sync committee signatures.
pub const DOMAIN_SYNC_COMMITTEE: [u8; 4] = [0x07, 0x00, 0x00, 0x00];

/// A BLS12-381 public key (48 bytes, compressed G1 point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlsPublicKey(pub [u8; BLS_PUBKEY_LEN]);

impl Serialize for BlsPublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BlsPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl BlsPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, &'static str> {
        if bytes.len() != BLS_PUBKEY_LEN {
            return Err("invalid BLS public key length");
        }
        let mut arr = [0u8; BLS_PUBKEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

/// A BLS12-381 signature (96 bytes, compressed G2 point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlsSignature(pub [u8; BLS_SIGNATURE_LEN]);

impl Serialize for BlsSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BlsSignature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl BlsSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, &'static str> {
        if bytes.len() != BLS_SIGNATURE_LEN {
            return Err("invalid BLS signature length");
        }
        let mut arr = [0u8; BLS_SIGNATURE_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

/// A beacon chain block header — the minimal header needed to verify the
/// chain without storing full blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: Bytes32,
    pub state_root: Bytes32,
    pub body_root: Bytes32,
}

fn beacon_block_header_def() -> SszDef {
    SszDef::container(vec![
        FieldDef::new("slot", SszDef::uint(8)),
        FieldDef::new("proposer_index", SszDef::uint(8)),
        FieldDef::new("parent_root", SszDef::vector(SszDef::uint(1), 32)),
        FieldDef::new("state_root", SszDef::vector(SszDef::uint(1), 32)),
        FieldDef::new("body_root", SszDef::vector(SszDef::uint(1), 32)),
    ])
}

impl BeaconBlockHeader {
    /// Encode in SSZ wire order: every field here is fixed-size, so this is
    /// just their concatenation.
    pub fn to_ssz_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 8 + 32 + 32 + 32);
        out.extend_from_slice(&self.slot.to_le_bytes());
        out.extend_from_slice(&self.proposer_index.to_le_bytes());
        out.extend_from_slice(self.parent_root.as_slice());
        out.extend_from_slice(self.state_root.as_slice());
        out.extend_from_slice(self.body_root.as_slice());
        out
    }

    /// `hash_tree_root(self)` (§4.1), used as the signing root input and as
    /// the leaf proven against the beacon-state finality/next-committee
    /// branches.
    pub fn hash_tree_root(&self) -> Result<Bytes32, ssz::SszError> {
        let def = beacon_block_header_def();
        let bytes = self.to_ssz_bytes();
        ssz::hash_tree_root(SszObject::new(&def, ByteView::new(&bytes)))
    }
}

/// The sync committee — 512 validators that sign off on the chain head.
/// Rotates every ~27 hours (256 epochs).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommittee {
    pub pubkeys: Vec<BlsPublicKey>,
    pub aggregate_pubkey: BlsPublicKey,
}

fn sync_committee_def() -> SszDef {
    SszDef::container(vec![
        FieldDef::new("pubkeys", SszDef::vector(SszDef::vector(SszDef::uint(1), 48), SYNC_COMMITTEE_SIZE)),
        FieldDef::new("aggregate_pubkey", SszDef::vector(SszDef::uint(1), 48)),
    ])
}

impl SyncCommittee {
    /// Validate the sync committee has the correct number of members.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.pubkeys.len() != SYNC_COMMITTEE_SIZE {
            return Err("sync committee must have exactly 512 members");
        }
        Ok(())
    }

    pub fn to_ssz_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SYNC_COMMITTEE_SIZE * 48 + 48);
        for pk in &self.pubkeys {
            out.extend_from_slice(&pk.0);
        }
        out.extend_from_slice(&self.aggregate_pubkey.0);
        out
    }

    pub fn hash_tree_root(&self) -> Result<Bytes32, ssz::SszError> {
        let def = sync_committee_def();
        let bytes = self.to_ssz_bytes();
        ssz::hash_tree_root(SszObject::new(&def, ByteView::new(&bytes)))
    }

    /// Raw compressed pubkeys, the shape `bls::verify` wants.
    pub fn raw_pubkeys(&self) -> Vec<[u8; 48]> {
        self.pubkeys.iter().map(|pk| pk.0).collect()
    }
}

/// The aggregate BLS signature from the sync committee, with a bitvector
/// marking which of the 512 members signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAggregate {
    pub sync_committee_bits: Vec<u8>,
    pub sync_committee_signature: BlsSignature,
}

impl SyncAggregate {
    pub fn num_participants(&self) -> usize {
        self.sync_committee_bits.iter().map(|byte| byte.count_ones() as usize).sum()
    }
}

/// A light client update from the beacon chain — what peers send us to
/// advance our view of the chain head. Every field must be verified before
/// being accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightClientUpdate {
    pub attested_header: BeaconBlockHeader,
    pub next_sync_committee: Option<SyncCommittee>,
    pub next_sync_committee_branch: Vec<Bytes32>,
    pub finalized_header: BeaconBlockHeader,
    pub finality_branch: Vec<Bytes32>,
    pub sync_aggregate: SyncAggregate,
    pub signature_slot: u64,
}

/// A light client bootstrap — the initial data needed to start syncing
/// from a trusted checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightClientBootstrap {
    pub header: BeaconBlockHeader,
    pub current_sync_committee: SyncCommittee,
    pub current_sync_committee_branch: Vec<Bytes32>,
}

/// Execution payload header — the link between beacon and execution layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: Bytes32,
    pub fee_recipient: Address,
    pub state_root: Bytes32,
    pub receipts_root: Bytes32,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub base_fee_per_gas: u64,
    pub block_hash: Bytes32,
    pub transactions_root: Bytes32,
    pub withdrawals_root: Bytes32,
}

/// Fork data used for computing signing domains.
#[derive(Clone, Debug)]
pub struct ForkData {
    pub current_version: [u8; 4],
    pub genesis_validators_root: Bytes32,
}

/// Signing domain, computed from fork version and genesis validators root,
/// to prevent cross-chain replay attacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SigningDomain(pub [u8; 32]);

#[cfg(test)]
mod tests {
    use super::*;

    fn header(slot: u64) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot,
            proposer_index: 1,
            parent_root: Bytes32::ZERO,
            state_root: Bytes32::ZERO,
            body_root: Bytes32::ZERO,
        }
    }

    #[test]
    fn header_hash_tree_root_is_deterministic() {
        let h = header(100);
        let r1 = h.hash_tree_root().unwrap();
        let r2 = h.hash_tree_root().unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn different_slots_hash_differently() {
        assert_ne!(header(1).hash_tree_root().unwrap(), header(2).hash_tree_root().unwrap());
    }

    #[test]
    fn sync_committee_requires_512_members() {
        let committee = SyncCommittee { pubkeys: vec![BlsPublicKey([0u8; 48]); 100], aggregate_pubkey: BlsPublicKey([0u8; 48]) };
        assert!(committee.validate().is_err());
    }
}
