//! Multi-proof construction and verification (§4.1).
//!
//! Scoped to a single object's own chunk tree: a `Container`'s fields, or a
//! `Vector`/`List`'s packed/child leaves. Proving a path that crosses an
//! object boundary (e.g. a specific validator pubkey inside the sync
//! committee that is itself a field of a larger container) composes two
//! calls — one multi-proof per tree, with `Gindex::add` gluing the two
//! numbering spaces together — the same way the light-client update's
//! finality branch and next-sync-committee branch are two independent
//! single-path proofs rather than one proof spanning both. Real light
//! client updates rarely need a multi-path proof spanning a `List`'s
//! length mixin, so the length-mixin pair sits one level above what
//! `build_tree` returns; callers that need it fold it in themselves with
//! `mix_in_length`'s sibling (the length chunk) as an extra witness.

use std::collections::HashMap;

use super::gindex::Gindex;
use super::merkle::sha256_pair;
use super::object::SszObject;
use super::SszError;
use crate::common::Bytes32;

/// Every node hash reachable in `obj`'s own chunk tree, keyed by the
/// generalized index relative to that tree's root (`1`).
pub struct MerkleTree {
    nodes: HashMap<u64, [u8; 32]>,
    pub depth: u32,
}

impl MerkleTree {
    pub fn root(&self) -> Bytes32 {
        Bytes32::from(*self.nodes.get(&1).expect("root always populated"))
    }

    pub fn node(&self, g: Gindex) -> Option<[u8; 32]> {
        self.nodes.get(&g.0).copied()
    }
}

pub fn build_tree(obj: SszObject<'_>) -> Result<MerkleTree, SszError> {
    let leaves = super::merkle::leaves_for(&obj)?;
    let depth = obj.def().chunk_depth(Some(leaves.len()));
    let mut nodes = HashMap::new();
    build_recursive(&leaves, depth, 1, &mut nodes);
    Ok(MerkleTree { nodes, depth })
}

fn build_recursive(leaves: &[[u8; 32]], depth: u32, gindex: u64, nodes: &mut HashMap<u64, [u8; 32]>) -> [u8; 32] {
    if depth == 0 {
        let h = leaves.first().copied().unwrap_or([0u8; 32]);
        nodes.insert(gindex, h);
        return h;
    }
    let mid = 1usize << (depth - 1);
    let (left_leaves, right_leaves) = if leaves.len() <= mid {
        (leaves, &[][..])
    } else {
        (&leaves[..mid], &leaves[mid..])
    };
    let left = if left_leaves.is_empty() {
        let h = super::merkle::zero_hash_pub(depth - 1);
        nodes.insert(gindex * 2, h);
        h
    } else {
        build_recursive(left_leaves, depth - 1, gindex * 2, nodes)
    };
    let right = if right_leaves.is_empty() {
        let h = super::merkle::zero_hash_pub(depth - 1);
        nodes.insert(gindex * 2 + 1, h);
        h
    } else {
        build_recursive(right_leaves, depth - 1, gindex * 2 + 1, nodes)
    };
    let h = sha256_pair(&left, &right);
    nodes.insert(gindex, h);
    h
}

/// Branch indices (§4.1): the sibling at each step from `index` up to the
/// root, excluding the root itself.
fn branch_indices(index: u64) -> Vec<u64> {
    let mut out = vec![index ^ 1];
    while *out.last().unwrap() > 1 {
        out.push((out.last().unwrap() / 2) ^ 1);
    }
    out.pop();
    out
}

/// The index itself, then its ancestors up to and including the root.
fn path_indices(index: u64) -> Vec<u64> {
    let mut out = vec![index];
    while *out.last().unwrap() > 1 {
        out.push(out.last().unwrap() / 2);
    }
    out
}

/// Helper indices for a set of target leaves: every branch-sibling needed
/// to recompute the root, minus anything already on one of the target
/// paths (since the verifier derives those, it doesn't need them supplied),
/// sorted in descending gindex order — the wire-format detail both the
/// prover and verifier must agree on.
fn helper_indices(indices: &[u64]) -> Vec<u64> {
    let mut helpers: std::collections::BTreeSet<u64> = std::collections::BTreeSet::new();
    let mut paths: std::collections::HashSet<u64> = std::collections::HashSet::new();
    for &idx in indices {
        helpers.extend(branch_indices(idx));
        paths.extend(path_indices(idx));
    }
    let mut result: Vec<u64> = helpers.into_iter().filter(|h| !paths.contains(h)).collect();
    result.sort_unstable_by(|a, b| b.cmp(a));
    result
}

/// Build a multi-proof over `obj`'s own chunk tree for the given target
/// gindices, returned as descending-gindex-ordered witnesses.
pub fn create_multi_proof(obj: SszObject<'_>, indices: &[Gindex]) -> Result<Vec<Bytes32>, SszError> {
    let tree = build_tree(obj)?;
    let raw_indices: Vec<u64> = indices.iter().map(|g| g.0).collect();
    let helpers = helper_indices(&raw_indices);
    let mut witnesses = Vec::with_capacity(helpers.len());
    for h in helpers {
        let node = tree.nodes.get(&h).copied().ok_or(SszError::MissingWitness(h))?;
        witnesses.push(Bytes32::from(node));
    }
    Ok(witnesses)
}

/// Recompute the root from a set of `(gindex, leaf)` pairs plus a
/// descending-gindex-ordered witness list, and compare it against
/// `expected_root`.
pub fn verify_multi_proof(
    leaves: &[(Gindex, Bytes32)],
    proof: &[Bytes32],
    expected_root: Bytes32,
) -> Result<(), SszError> {
    let raw_indices: Vec<u64> = leaves.iter().map(|(g, _)| g.0).collect();
    let helpers = helper_indices(&raw_indices);
    if helpers.len() != proof.len() {
        return Err(SszError::MissingWitness(*helpers.first().unwrap_or(&0)));
    }

    let mut objects: HashMap<u64, [u8; 32]> = HashMap::new();
    for (g, leaf) in leaves {
        objects.insert(g.0, leaf.0);
    }
    for (h, w) in helpers.iter().zip(proof.iter()) {
        objects.insert(*h, w.0);
    }

    let mut keys: Vec<u64> = objects.keys().copied().collect();
    keys.sort_unstable_by(|a, b| b.cmp(a));
    let mut pos = 0;
    while pos < keys.len() {
        let k = keys[pos];
        if k > 1 && objects.contains_key(&k) && objects.contains_key(&(k ^ 1)) && !objects.contains_key(&(k / 2)) {
            let left = objects[&(k & !1)];
            let right = objects[&(k | 1)];
            let parent = sha256_pair(&left, &right);
            objects.insert(k / 2, parent);
            keys.push(k / 2);
        }
        pos += 1;
    }

    let computed = objects.get(&1).ok_or(SszError::InvalidGindex)?;
    if *computed == expected_root.0 {
        Ok(())
    } else {
        Err(SszError::RootMismatch {
            computed: hex::encode(computed),
            expected: hex::encode(expected_root.as_slice()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ByteView;
    use crate::ssz::def::{FieldDef, SszDef};

    #[test]
    fn multi_proof_roundtrip_on_container() {
        let def = SszDef::container(vec![
            FieldDef::new("a", SszDef::uint(8)),
            FieldDef::new("b", SszDef::uint(8)),
            FieldDef::new("c", SszDef::uint(8)),
            FieldDef::new("d", SszDef::uint(8)),
        ]);
        let mut bytes = vec![0u8; 32];
        for i in 0..4u64 {
            bytes[i as usize * 8..i as usize * 8 + 8].copy_from_slice(&(i + 1).to_le_bytes());
        }
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        let tree = build_tree(obj).unwrap();
        let root = tree.root();

        // Field "a" is gindex 4, field "c" is gindex 6 (0-indexed fields at
        // depth 2: 4,5,6,7).
        let targets = vec![Gindex(4), Gindex(6)];
        let proof = create_multi_proof(obj, &targets).unwrap();

        let leaf_a = tree.node(Gindex(4)).unwrap();
        let leaf_c = tree.node(Gindex(6)).unwrap();
        let leaves = vec![(Gindex(4), Bytes32::from(leaf_a)), (Gindex(6), Bytes32::from(leaf_c))];
        verify_multi_proof(&leaves, &proof, root).unwrap();
    }

    #[test]
    fn tampered_witness_fails_verification() {
        let def = SszDef::container(vec![
            FieldDef::new("a", SszDef::uint(8)),
            FieldDef::new("b", SszDef::uint(8)),
        ]);
        let mut bytes = vec![0u8; 16];
        bytes[0..8].copy_from_slice(&1u64.to_le_bytes());
        bytes[8..16].copy_from_slice(&2u64.to_le_bytes());
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        let tree = build_tree(obj).unwrap();
        let root = tree.root();

        let leaf_a = tree.node(Gindex(2)).unwrap();
        let targets = vec![Gindex(2)];
        let mut proof = create_multi_proof(obj, &targets).unwrap();
        if let Some(first) = proof.first_mut() {
            let mut bytes = first.0;
            bytes[0] ^= 0xff;
            *first = Bytes32::from(bytes);
        }
        let leaves = vec![(Gindex(2), Bytes32::from(leaf_a))];
        assert!(verify_multi_proof(&leaves, &proof, root).is_err());
    }
}
