//! Trie construction, root hashing, and proof build/verify (§4.2).
//!
//! Insertion is expressed functionally — each call rebuilds the nodes on
//! the path from the insertion point to the root and returns the new tree
//! — rather than mutating nodes in place through a `parent` back-pointer.
//! This sidesteps §9's "cyclic parent pointers" design note entirely: there
//! is nothing to invalidate, because nothing is mutated after it's built.

use super::keyed;
use super::nibbles::{bytes_to_nibbles, common_prefix_len};
use super::node::{keccak256, NodeRef, TrieNode};
use super::MptError;
use crate::common::{Address, Bytes32};

/// A Merkle-Patricia trie built up from `(path, value)` insertions.
/// `path` is expected to already be keccak-hashed (or otherwise
/// fixed-width) nibbles per §4.2 — see [`Trie::insert_keccak`] for the
/// common "hash the key first" case used by the state and storage tries.
#[derive(Debug, Clone)]
pub struct Trie {
    root: TrieNode,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Trie { root: TrieNode::Empty }
    }

    /// Insert a raw key (already split into nibbles) and value.
    pub fn insert(&mut self, key_nibbles: &[u8], value: Vec<u8>) -> Result<(), MptError> {
        let root = std::mem::replace(&mut self.root, TrieNode::Empty);
        self.root = insert_node(root, key_nibbles, value)?;
        Ok(())
    }

    /// Insert at `keccak256(key)` — the state trie (`keccak(address)`) and
    /// storage trie (`keccak(slot)`) key derivation of §4.5.
    pub fn insert_keccak(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), MptError> {
        let nibbles = bytes_to_nibbles(&keccak256(key));
        self.insert(&nibbles, value)
    }

    pub fn root_hash(&self) -> Bytes32 {
        self.root.hash()
    }

    /// Emit the RLP-encoded node list a verifier would need to prove
    /// `key_nibbles` against this trie's root — the root's own encoding
    /// first, then every descendant whose reference is hash-addressed
    /// (nodes short enough to embed inline never get a separate entry,
    /// matching how `Trie::verify` resolves them).
    pub fn proof_for(&self, key_nibbles: &[u8]) -> Vec<Vec<u8>> {
        let mut proof = vec![self.root.encode_raw()];
        let mut node = &self.root;
        let mut nibbles = key_nibbles;
        loop {
            let next = match node {
                TrieNode::Empty | TrieNode::Leaf { .. } => None,
                TrieNode::Extension { path, child } => {
                    if nibbles.len() < path.len() || nibbles[..path.len()] != path[..] {
                        None
                    } else {
                        nibbles = &nibbles[path.len()..];
                        child.as_node()
                    }
                }
                TrieNode::Branch { children, .. } => {
                    if nibbles.is_empty() {
                        None
                    } else {
                        let idx = nibbles[0] as usize;
                        nibbles = &nibbles[1..];
                        children[idx].as_node()
                    }
                }
            };
            match next {
                Some(child_node) => {
                    let raw = child_node.encode_raw();
                    if raw.len() >= 32 {
                        proof.push(raw);
                    }
                    node = child_node;
                }
                None => break,
            }
        }
        proof
    }

    pub fn proof_for_address(&self, address: &Address) -> Vec<Vec<u8>> {
        self.proof_for(&bytes_to_nibbles(&keccak256(address.as_slice())))
    }

    /// Verify `proof_rlps` proves `key_nibbles` against `root`, returning
    /// the terminal value if the key is present, `None` if the proof
    /// demonstrates the key's absence, or an error if the proof is
    /// malformed or doesn't match `root` (§4.2 `verify`).
    pub fn verify(
        root: Bytes32,
        key_nibbles: &[u8],
        proof_rlps: &[Vec<u8>],
    ) -> Result<Option<Vec<u8>>, MptError> {
        if proof_rlps.is_empty() {
            return Err(MptError::EmptyProof);
        }
        let first = &proof_rlps[0];
        let computed = Bytes32::from(keccak256(first));
        if computed != root {
            return Err(MptError::RootMismatch {
                computed: hex::encode(computed.as_slice()),
                expected: hex::encode(root.as_slice()),
            });
        }

        let mut node = TrieNode::decode(first)?;
        let mut nibbles = key_nibbles;
        let mut proof_idx = 0usize;
        let mut depth = 0usize;
        loop {
            match node {
                TrieNode::Empty => return Ok(None),
                TrieNode::Leaf { path, value } => {
                    return if nibbles == path.as_slice() {
                        Ok(Some(value))
                    } else {
                        Err(MptError::IncompleteProof { depth })
                    };
                }
                TrieNode::Extension { path, child } => {
                    if nibbles.len() < path.len() || nibbles[..path.len()] != path[..] {
                        return Err(MptError::IncompleteProof { depth });
                    }
                    nibbles = &nibbles[path.len()..];
                    node = resolve_child(child, proof_rlps, &mut proof_idx, depth)?;
                    depth += 1;
                }
                TrieNode::Branch { children, value } => {
                    if nibbles.is_empty() {
                        return Ok(value);
                    }
                    let idx = nibbles[0] as usize;
                    nibbles = &nibbles[1..];
                    node = resolve_child(children[idx].clone(), proof_rlps, &mut proof_idx, depth)?;
                    depth += 1;
                }
            }
        }
    }

    pub fn verify_account(
        state_root: Bytes32,
        address: &Address,
        proof_rlps: &[Vec<u8>],
    ) -> Result<Option<Vec<u8>>, MptError> {
        let nibbles = bytes_to_nibbles(&keyed::state_key(address).0);
        Self::verify(state_root, &nibbles, proof_rlps)
    }

    pub fn verify_storage(
        storage_root: Bytes32,
        slot: &Bytes32,
        proof_rlps: &[Vec<u8>],
    ) -> Result<Option<Vec<u8>>, MptError> {
        let nibbles = bytes_to_nibbles(&keyed::storage_key(slot).0);
        Self::verify(storage_root, &nibbles, proof_rlps)
    }

    pub fn verify_by_index(
        root: Bytes32,
        tx_index: u64,
        proof_rlps: &[Vec<u8>],
    ) -> Result<Option<Vec<u8>>, MptError> {
        let key = keyed::rlp_index(tx_index);
        let nibbles = bytes_to_nibbles(&key);
        Self::verify(root, &nibbles, proof_rlps)
    }
}

fn resolve_child(
    child: NodeRef,
    proof_rlps: &[Vec<u8>],
    proof_idx: &mut usize,
    depth: usize,
) -> Result<TrieNode, MptError> {
    match child {
        NodeRef::Empty => Ok(TrieNode::Empty),
        NodeRef::Inline(node) => Ok(*node),
        NodeRef::Hash(expected) => {
            *proof_idx += 1;
            let raw = proof_rlps.get(*proof_idx).ok_or(MptError::IncompleteProof { depth })?;
            let got = Bytes32::from(keccak256(raw));
            if got != expected {
                return Err(MptError::ChildHashMismatch { depth });
            }
            TrieNode::decode(raw)
        }
    }
}

fn into_node(r: NodeRef) -> Result<TrieNode, MptError> {
    match r {
        NodeRef::Empty => Ok(TrieNode::Empty),
        NodeRef::Inline(node) => Ok(*node),
        NodeRef::Hash(_) => Err(MptError::UnexpectedNodeShape {
            depth: 0,
            shape: "cannot insert below a hash-only child reference".to_string(),
        }),
    }
}

fn empty_children() -> Box<[NodeRef; 16]> {
    Box::new(std::array::from_fn(|_| NodeRef::Empty))
}

fn wrap_extension(prefix: Vec<u8>, node: TrieNode) -> TrieNode {
    if prefix.is_empty() {
        node
    } else {
        TrieNode::Extension { path: prefix, child: NodeRef::from_node(node) }
    }
}

/// Rebuild the node at this position in the tree after inserting
/// `(nibbles, value)` below it (§4.2's insert cases).
fn insert_node(node: TrieNode, nibbles: &[u8], value: Vec<u8>) -> Result<TrieNode, MptError> {
    match node {
        TrieNode::Empty => Ok(TrieNode::Leaf { path: nibbles.to_vec(), value }),

        TrieNode::Leaf { path, value: old_value } => {
            let common = common_prefix_len(&path, nibbles);
            if common == path.len() && common == nibbles.len() {
                // Same key: overwrite.
                return Ok(TrieNode::Leaf { path, value });
            }
            if common == path.len() {
                // The old leaf's key is a strict prefix of the new key: it
                // becomes a branch's own value, and the new key continues
                // one nibble below.
                let mut children = empty_children();
                let next = nibbles[common] as usize;
                children[next] = NodeRef::from_node(TrieNode::Leaf {
                    path: nibbles[common + 1..].to_vec(),
                    value,
                });
                let branch = TrieNode::Branch { children, value: Some(old_value) };
                return Ok(wrap_extension(path, branch));
            }
            // Genuine divergence partway through both paths.
            let mut children = empty_children();
            let old_next = path[common] as usize;
            children[old_next] =
                NodeRef::from_node(TrieNode::Leaf { path: path[common + 1..].to_vec(), value: old_value });
            let new_next = nibbles[common] as usize;
            children[new_next] =
                NodeRef::from_node(TrieNode::Leaf { path: nibbles[common + 1..].to_vec(), value });
            let branch = TrieNode::Branch { children, value: None };
            Ok(wrap_extension(path[..common].to_vec(), branch))
        }

        TrieNode::Extension { path, child } => {
            let common = common_prefix_len(&path, nibbles);
            if common == path.len() {
                // Full match: descend into the child with what's left.
                let remaining = &nibbles[common..];
                let child_node = into_node(child)?;
                let new_child = insert_node(child_node, remaining, value)?;
                return Ok(wrap_extension(path, new_child));
            }
            // Divergence partway through the extension's own path.
            let mut children = empty_children();
            let old_next = path[common] as usize;
            let old_remaining = path[common + 1..].to_vec();
            children[old_next] = if old_remaining.is_empty() {
                child
            } else {
                NodeRef::from_node(TrieNode::Extension { path: old_remaining, child })
            };
            let new_next = nibbles[common] as usize;
            children[new_next] =
                NodeRef::from_node(TrieNode::Leaf { path: nibbles[common + 1..].to_vec(), value });
            let branch = TrieNode::Branch { children, value: None };
            Ok(wrap_extension(path[..common].to_vec(), branch))
        }

        TrieNode::Branch { mut children, value: branch_value } => {
            if nibbles.is_empty() {
                return Ok(TrieNode::Branch { children, value: Some(value) });
            }
            let idx = nibbles[0] as usize;
            let child_node = into_node(children[idx].clone())?;
            let new_child = insert_node(child_node, &nibbles[1..], value)?;
            children[idx] = NodeRef::from_node(new_child);
            Ok(TrieNode::Branch { children, value: branch_value })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpt::nibbles::bytes_to_nibbles;

    #[test]
    fn single_insert_round_trips_through_proof() {
        let mut trie = Trie::new();
        trie.insert_keccak(b"key1", b"value1".to_vec()).unwrap();
        let root = trie.root_hash();
        let nibbles = bytes_to_nibbles(&keccak256(b"key1"));
        let proof = trie.proof_for(&nibbles);
        let value = Trie::verify(root, &nibbles, &proof).unwrap();
        assert_eq!(value, Some(b"value1".to_vec()));
    }

    #[test]
    fn multiple_inserts_diverge_into_branches() {
        let mut trie = Trie::new();
        let pairs: Vec<(&[u8], &[u8])> = vec![
            (b"alpha", b"1"),
            (b"alpha-two", b"2"),
            (b"beta", b"3"),
            (b"gamma-very-long-key-indeed", b"4"),
        ];
        for (k, v) in &pairs {
            trie.insert_keccak(k, v.to_vec()).unwrap();
        }
        let root = trie.root_hash();
        for (k, v) in &pairs {
            let nibbles = bytes_to_nibbles(&keccak256(k));
            let proof = trie.proof_for(&nibbles);
            let value = Trie::verify(root, &nibbles, &proof).unwrap();
            assert_eq!(value.as_deref(), Some(*v));
        }
    }

    #[test]
    fn updating_existing_key_changes_root() {
        let mut trie = Trie::new();
        trie.insert_keccak(b"key", b"v1".to_vec()).unwrap();
        let root1 = trie.root_hash();
        trie.insert_keccak(b"key", b"v2".to_vec()).unwrap();
        let root2 = trie.root_hash();
        assert_ne!(root1, root2);
        let nibbles = bytes_to_nibbles(&keccak256(b"key"));
        let proof = trie.proof_for(&nibbles);
        assert_eq!(Trie::verify(root2, &nibbles, &proof).unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn empty_trie_root_matches_known_constant() {
        let trie = Trie::new();
        assert_eq!(
            hex::encode(trie.root_hash().as_slice()),
            "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
        );
    }

    #[test]
    fn tampered_proof_node_is_rejected() {
        let mut trie = Trie::new();
        trie.insert_keccak(b"alpha", b"1".to_vec()).unwrap();
        trie.insert_keccak(b"alpha-two", b"2".to_vec()).unwrap();
        let root = trie.root_hash();
        let nibbles = bytes_to_nibbles(&keccak256(b"alpha"));
        let mut proof = trie.proof_for(&nibbles);
        if let Some(last) = proof.last_mut() {
            last.push(0xff);
        }
        assert!(Trie::verify(root, &nibbles, &proof).is_err());
    }

    #[test]
    fn wrong_root_is_rejected() {
        let mut trie = Trie::new();
        trie.insert_keccak(b"key1", b"value1".to_vec()).unwrap();
        let nibbles = bytes_to_nibbles(&keccak256(b"key1"));
        let proof = trie.proof_for(&nibbles);
        let wrong_root = Bytes32::from([0xAAu8; 32]);
        assert!(matches!(Trie::verify(wrong_root, &nibbles, &proof), Err(MptError::RootMismatch { .. })));
    }
}
