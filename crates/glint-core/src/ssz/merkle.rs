//! `hash_tree_root` (§4.1): turns an `SszObject` into its 32-byte SSZ
//! Merkle root.
//!
//! The recursive `merkleize` below short-circuits whenever an entire
//! subtree is absent (an unset branch of a sparse, deeply-bounded `List`)
//! by substituting a precomputed zero hash instead of materializing
//! `2^depth` empty leaves — the only way this stays cheap for containers
//! like the validator-index lists where `max_length` can be in the
//! millions but the actual leaf count is a few hundred.

use std::sync::OnceLock;

use sha2::{Digest, Sha256};

use super::def::SszDef;
use super::object::SszObject;
use super::SszError;
use crate::common::Bytes32;

const MAX_ZERO_HASH_DEPTH: usize = 40;

fn zero_hashes() -> &'static [[u8; 32]; MAX_ZERO_HASH_DEPTH + 1] {
    static TABLE: OnceLock<[[u8; 32]; MAX_ZERO_HASH_DEPTH + 1]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0u8; 32]; MAX_ZERO_HASH_DEPTH + 1];
        for d in 1..=MAX_ZERO_HASH_DEPTH {
            table[d] = sha256_pair(&table[d - 1], &table[d - 1]);
        }
        table
    })
}

fn zero_hash(depth: u32) -> [u8; 32] {
    let depth = depth as usize;
    if depth <= MAX_ZERO_HASH_DEPTH {
        zero_hashes()[depth]
    } else {
        // Depths past the cache are only reached by pathological max_length
        // values no real container uses; fall back to direct computation.
        let prev = zero_hash(depth as u32 - 1);
        sha256_pair(&prev, &prev)
    }
}

pub(super) fn sha256_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn uint_chunk(value: u64) -> [u8; 32] {
    let mut chunk = [0u8; 32];
    chunk[..8].copy_from_slice(&value.to_le_bytes());
    chunk
}

fn mix_in_length(root: [u8; 32], length: usize) -> [u8; 32] {
    sha256_pair(&root, &uint_chunk(length as u64))
}

fn mix_in_selector(root: [u8; 32], selector: u8) -> [u8; 32] {
    sha256_pair(&root, &uint_chunk(selector as u64))
}

/// Fold `leaves` into a single root under a tree of the given `depth`,
/// treating anything past `leaves.len()` as zero. `depth == 0` means a
/// single chunk (no hashing).
fn merkleize(leaves: &[[u8; 32]], depth: u32) -> [u8; 32] {
    if depth == 0 {
        return leaves.first().copied().unwrap_or([0u8; 32]);
    }
    let mid = 1usize << (depth - 1);
    let (left_leaves, right_leaves) = if leaves.len() <= mid {
        (leaves, &[][..])
    } else {
        (&leaves[..mid], &leaves[mid..])
    };
    let left = if left_leaves.is_empty() { zero_hash(depth - 1) } else { merkleize(left_leaves, depth - 1) };
    let right = if right_leaves.is_empty() { zero_hash(depth - 1) } else { merkleize(right_leaves, depth - 1) };
    sha256_pair(&left, &right)
}

/// Pack raw bytes into 32-byte chunks, zero-padding the final chunk.
fn pack_bytes(bytes: &[u8]) -> Vec<[u8; 32]> {
    if bytes.is_empty() {
        return Vec::new();
    }
    bytes
        .chunks(32)
        .map(|c| {
            let mut chunk = [0u8; 32];
            chunk[..c.len()].copy_from_slice(c);
            chunk
        })
        .collect()
}

pub fn hash_tree_root(obj: SszObject<'_>) -> Result<Bytes32, SszError> {
    Ok(Bytes32::from(hash_tree_root_raw(obj)?))
}

fn hash_tree_root_raw(obj: SszObject<'_>) -> Result<[u8; 32], SszError> {
    match obj.def() {
        SszDef::Uint { .. } | SszDef::Boolean => {
            let mut chunk = [0u8; 32];
            chunk[..obj.byte_len()].copy_from_slice(obj.as_slice());
            Ok(chunk)
        }
        SszDef::None => Ok([0u8; 32]),
        SszDef::BitVector { .. } => {
            let leaves = leaves_for(&obj)?;
            let depth = obj.def().chunk_depth(None);
            Ok(merkleize(&leaves, depth))
        }
        SszDef::BitList { .. } => {
            let len = obj.len()?;
            let leaves = leaves_for(&obj)?;
            let depth = obj.def().chunk_depth(None);
            Ok(mix_in_length(merkleize(&leaves, depth), len))
        }
        SszDef::Vector { .. } => {
            let leaves = leaves_for(&obj)?;
            let depth = obj.def().chunk_depth(None);
            Ok(merkleize(&leaves, depth))
        }
        SszDef::List { .. } => {
            let len = obj.len()?;
            let leaves = leaves_for(&obj)?;
            let depth = obj.def().chunk_depth(Some(len));
            Ok(mix_in_length(merkleize(&leaves, depth), len))
        }
        SszDef::Container { fields, .. } => {
            let leaves = leaves_for(&obj)?;
            let depth = super::def::depth_for_chunks_pub(fields.len().max(1));
            Ok(merkleize(&leaves, depth))
        }
        SszDef::Union { .. } => {
            let selector = obj.as_slice()[0];
            let payload_def = match obj.def() {
                SszDef::Union { variants } => variants
                    .get(selector as usize)
                    .ok_or(SszError::UnknownUnionSelector(selector))?,
                _ => unreachable!(),
            };
            let payload = crate::common::ByteView::new(&obj.as_slice()[1..]);
            let value_root = hash_tree_root_raw(SszObject::new(payload_def, payload))?;
            let inner = merkleize(&[value_root], 1);
            Ok(mix_in_selector(inner, selector))
        }
    }
}

/// The leaf layer of `obj`'s own chunk tree (before any length/selector
/// mixin), shared between `hash_tree_root` and the multi-proof builder so
/// the two always agree on what a "chunk" is for a given definition.
pub(super) fn leaves_for(obj: &SszObject<'_>) -> Result<Vec<[u8; 32]>, SszError> {
    match obj.def() {
        SszDef::Uint { .. } | SszDef::Boolean | SszDef::None => Ok(vec![hash_tree_root_raw(*obj)?]),
        SszDef::BitVector { .. } => Ok(pack_bytes(obj.as_slice())),
        SszDef::BitList { .. } => {
            let len = obj.len()?;
            let data_bytes_len = (len + 7) / 8;
            let data = &obj.as_slice()[..data_bytes_len.min(obj.as_slice().len())];
            let mut truncated = data.to_vec();
            if len % 8 != 0 {
                if let Some(last) = truncated.last_mut() {
                    let keep_mask = (1u16 << (len % 8)) as u8 - 1;
                    *last &= keep_mask;
                }
            }
            Ok(pack_bytes(&truncated))
        }
        SszDef::Vector { element, length } => sequence_leaves(obj, element, *length),
        SszDef::List { element, .. } => {
            let len = obj.len()?;
            sequence_leaves(obj, element, len)
        }
        SszDef::Container { fields, .. } => {
            let mut leaves = Vec::with_capacity(fields.len());
            for f in fields {
                let field_obj = obj.get(f.name)?;
                leaves.push(hash_tree_root_raw(field_obj)?);
            }
            Ok(leaves)
        }
        SszDef::Union { .. } => Ok(vec![hash_tree_root_raw(*obj)?]),
    }
}

pub(super) fn zero_hash_pub(depth: u32) -> [u8; 32] {
    zero_hash(depth)
}

fn sequence_leaves(obj: &SszObject<'_>, element: &SszDef, length: usize) -> Result<Vec<[u8; 32]>, SszError> {
    match element.fixed_size() {
        Some(elem_size) if elem_size > 0 && elem_size < 32 => Ok(pack_bytes(obj.as_slice())),
        _ => {
            let mut leaves = Vec::with_capacity(length);
            for i in 0..length {
                leaves.push(hash_tree_root_raw(obj.at(i)?)?);
            }
            Ok(leaves)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ByteView;
    use crate::ssz::def::FieldDef;

    #[test]
    fn uint_root_is_left_padded_chunk() {
        let def = SszDef::uint(8);
        let bytes = 5u64.to_le_bytes();
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        let root = hash_tree_root(obj).unwrap();
        let mut expected = [0u8; 32];
        expected[..8].copy_from_slice(&bytes);
        assert_eq!(root.as_slice(), &expected);
    }

    #[test]
    fn empty_list_root_is_zero_mixed_with_zero_length() {
        let def = SszDef::list(SszDef::uint(8), 16);
        let obj = SszObject::new(&def, ByteView::new(&[]));
        let root = hash_tree_root(obj).unwrap();
        let expected = mix_in_length(zero_hash(obj.def().chunk_depth(Some(0))), 0);
        assert_eq!(root.as_slice(), &expected);
    }

    #[test]
    fn container_root_is_stable_under_field_reorder_is_false() {
        // Sanity: same fields, same order, same bytes -> same root twice.
        let def = SszDef::container(vec![
            FieldDef::new("a", SszDef::uint(8)),
            FieldDef::new("b", SszDef::uint(8)),
        ]);
        let mut bytes = vec![0u8; 16];
        bytes[0..8].copy_from_slice(&1u64.to_le_bytes());
        bytes[8..16].copy_from_slice(&2u64.to_le_bytes());
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        let r1 = hash_tree_root(obj).unwrap();
        let r2 = hash_tree_root(obj).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn bitlist_root_matches_length_mixin_of_truncated_packing() {
        let def = SszDef::BitList { max_bits: 512 };
        let bytes = [0x21u8]; // 5 set bits then sentinel at bit 5
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        let root = hash_tree_root(obj).unwrap();
        let truncated = vec![0x01u8]; // low 5 bits kept, sentinel masked off
        let leaves = pack_bytes(&truncated);
        let depth = super::super::def::depth_for_chunks_pub(((512usize + 255) / 256).max(1));
        let expected = mix_in_length(merkleize(&leaves, depth), 5);
        assert_eq!(root.as_slice(), &expected);
    }

    #[test]
    fn opt_mask_absent_fields_root_as_zero_chunks() {
        // Two equivalent containers: one declares "b" optional and leaves it
        // absent, the other has no OPT_MASK and sets "b" to zero explicitly.
        // Their roots must match (§8): an absent optional field hashes the
        // same as a present-but-zeroed one of the same type.
        let opt_def = SszDef::container_with_opt_mask(
            vec![FieldDef::new("a", SszDef::uint(8)), FieldDef::optional("b", SszDef::uint(8))],
            1,
        );
        let mut opt_bytes = vec![0x00u8];
        opt_bytes.extend_from_slice(&7u64.to_le_bytes());
        let opt_obj = SszObject::new(&opt_def, ByteView::new(&opt_bytes));
        let opt_root = hash_tree_root(opt_obj).unwrap();

        let plain_def =
            SszDef::container(vec![FieldDef::new("a", SszDef::uint(8)), FieldDef::new("b", SszDef::uint(8))]);
        let mut plain_bytes = vec![0u8; 16];
        plain_bytes[0..8].copy_from_slice(&7u64.to_le_bytes());
        let plain_obj = SszObject::new(&plain_def, ByteView::new(&plain_bytes));
        let plain_root = hash_tree_root(plain_obj).unwrap();

        assert_eq!(opt_root, plain_root);
    }
}
