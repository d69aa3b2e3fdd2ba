//! Runtime SSZ type definitions (§3, §4.1).
//!
//! A container's shape is data, not a Rust type: `C4Request`, beacon
//! headers, and sync committees across Deneb/Electra are all described by
//! the same handful of `SszDef` variants rather than by separate derived
//! structs. This is what lets `ssz::fork` hand back a different container
//! shape for the same logical message depending on fork without touching
//! the codec.

use std::fmt;

/// One field of a `Container` definition: its wire name and its type.
///
/// `optional` marks a field gated by the container's `OPT_MASK` bitfield
/// (§3): an optional field's presence bit is its position among the
/// container's other optional fields, counted in declaration order, and an
/// absent optional field contributes no wire bytes at all (no fixed slot,
/// no offset) but still occupies its normal chunk slot at hash-tree-root
/// time, zeroed (§4.1 "Containers with OPT_MASK").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub def: SszDef,
    pub optional: bool,
}

impl FieldDef {
    pub fn new(name: &'static str, def: SszDef) -> Self {
        Self { name, def, optional: false }
    }

    pub fn optional(name: &'static str, def: SszDef) -> Self {
        Self { name, def, optional: true }
    }
}

/// A runtime SSZ type definition.
///
/// Basic types (`Uint`, `Boolean`) are fixed-size. `Vector` is fixed-size
/// iff its element is; `List`/`BitList` are always variable-size.
/// `Container` is variable-size iff any field is. This mirrors the
/// fixed/variable split the encoding and Merkleization algorithms branch
/// on throughout §4.1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SszDef {
    Uint { width: usize },
    Boolean,
    /// A fixed-length sequence of a single element type.
    Vector { element: Box<SszDef>, length: usize },
    /// A variable-length sequence, bounded by `max_length` for
    /// Merkleization's length-mixin chunk count.
    List { element: Box<SszDef>, max_length: usize },
    /// A fixed-length bit sequence, packed 8 per byte.
    BitVector { bits: usize },
    /// A variable-length bit sequence with a sentinel high bit marking the
    /// true end (§4.1's bitlist length-recovery rule).
    BitList { max_bits: usize },
    /// A heterogeneous struct of named, ordered fields. `opt_mask_width`,
    /// when `Some(n)`, reserves a leading `n`-bit optional-field mask
    /// (the "OPT_MASK" convention some forked containers use to make a
    /// trailing run of fields optional without a full `Union`).
    Container { fields: Vec<FieldDef>, opt_mask_width: Option<usize> },
    /// A tagged union: `variants[0]` is always the "none" case where no
    /// other is supplied, matching SSZ union selector semantics.
    Union { variants: Vec<SszDef> },
    /// The SSZ `None` variant of a `Union`, carrying no payload.
    None,
}

impl SszDef {
    pub fn uint(width: usize) -> Self {
        SszDef::Uint { width }
    }

    pub fn vector(element: SszDef, length: usize) -> Self {
        SszDef::Vector { element: Box::new(element), length }
    }

    pub fn list(element: SszDef, max_length: usize) -> Self {
        SszDef::List { element: Box::new(element), max_length }
    }

    pub fn container(fields: Vec<FieldDef>) -> Self {
        SszDef::Container { fields, opt_mask_width: None }
    }

    pub fn container_with_opt_mask(fields: Vec<FieldDef>, opt_mask_width: usize) -> Self {
        SszDef::Container { fields, opt_mask_width: Some(opt_mask_width) }
    }

    /// Whether every instance of this type occupies the same number of
    /// encoded bytes.
    pub fn is_fixed_size(&self) -> bool {
        match self {
            SszDef::Uint { .. } | SszDef::Boolean | SszDef::BitVector { .. } | SszDef::None => true,
            SszDef::Vector { element, .. } => element.is_fixed_size(),
            SszDef::List { .. } | SszDef::BitList { .. } => false,
            // A container with an OPT_MASK is variable-size even if every
            // field happens to be fixed-size: which fields are actually
            // present (and therefore how many bytes the encoding occupies)
            // is a runtime property of the mask, not the definition alone.
            SszDef::Container { fields, opt_mask_width } => {
                opt_mask_width.is_none() && fields.iter().all(|f| f.def.is_fixed_size())
            }
            SszDef::Union { .. } => false,
        }
    }

    /// The fixed encoded size in bytes, if this type is fixed-size.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            SszDef::Uint { width } => Some(*width),
            SszDef::Boolean => Some(1),
            SszDef::BitVector { bits } => Some((*bits + 7) / 8),
            SszDef::None => Some(0),
            SszDef::Vector { element, length } => element.fixed_size().map(|s| s * length),
            SszDef::Container { fields, .. } => {
                if self.is_fixed_size() {
                    fields.iter().map(|f| f.def.fixed_size()).sum()
                } else {
                    None
                }
            }
            SszDef::List { .. } | SszDef::BitList { .. } | SszDef::Union { .. } => None,
        }
    }

    /// Number of 32-byte Merkle leaves this type's value packs into before
    /// the depth of its hash tree is taken, per §4.1's chunk-count rules:
    /// basic-type vectors/lists pack multiple values per chunk, everything
    /// else gets one chunk per element.
    pub fn chunk_count(&self, element_len_hint: Option<usize>) -> usize {
        match self {
            SszDef::Uint { .. } | SszDef::Boolean | SszDef::None => 1,
            SszDef::BitVector { bits } => ((*bits + 255) / 256).max(1),
            SszDef::BitList { max_bits } => ((*max_bits + 255) / 256).max(1),
            SszDef::Vector { element, length } => chunk_count_for_elements(element, *length),
            SszDef::List { element, max_length } => {
                let len = element_len_hint.unwrap_or(*max_length);
                chunk_count_for_elements(element, len).max(chunk_count_for_elements(element, *max_length))
            }
            SszDef::Container { fields, .. } => fields.len().max(1),
            SszDef::Union { variants } => variants.len().max(1),
        }
    }

    /// Merkleization tree depth: `ceil(log2(chunk_count))`.
    pub fn chunk_depth(&self, element_len_hint: Option<usize>) -> u32 {
        depth_for_chunks(self.chunk_count(element_len_hint))
    }

    pub fn as_container_fields(&self) -> Option<&[FieldDef]> {
        match self {
            SszDef::Container { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        let fields = self.as_container_fields()?;
        fields.iter().position(|f| f.name == name || camel_to_snake(f.name) == name)
    }
}

/// The OPT_MASK bit a field at `field_index` is gated by: its position
/// among only the container's `optional` fields, counted in declaration
/// order. Panics if `field_index` doesn't name an optional field — callers
/// only ask this of fields they already know are optional.
pub(super) fn optional_bit_index(fields: &[FieldDef], field_index: usize) -> usize {
    fields[..field_index].iter().filter(|f| f.optional).count()
}

fn chunk_count_for_elements(element: &SszDef, length: usize) -> usize {
    match element.fixed_size() {
        Some(elem_size) if elem_size > 0 && elem_size < 32 => {
            let per_chunk = 32 / elem_size;
            ((length + per_chunk - 1) / per_chunk).max(1)
        }
        _ => length.max(1),
    }
}

fn depth_for_chunks(chunk_count: usize) -> u32 {
    if chunk_count <= 1 {
        return 0;
    }
    let mut depth = 0u32;
    let mut cap = 1usize;
    while cap < chunk_count {
        cap *= 2;
        depth += 1;
    }
    depth
}

/// Exposed for `merkle.rs`, which needs the same chunk-count-to-depth
/// conversion when merkleizing a `max_length`-bounded tree.
pub(super) fn depth_for_chunks_pub(chunk_count: usize) -> u32 {
    depth_for_chunks(chunk_count)
}

/// Fallback lookup used by `field_index`: some wire schemas are documented
/// in CamelCase (as the beacon-API JSON is) while the in-memory definition
/// uses snake_case field names.
fn camel_to_snake(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for SszDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SszDef::Uint { width } => write!(f, "uint{}", width * 8),
            SszDef::Boolean => write!(f, "bool"),
            SszDef::Vector { element, length } => write!(f, "Vector[{element}, {length}]"),
            SszDef::List { element, max_length } => write!(f, "List[{element}, {max_length}]"),
            SszDef::BitVector { bits } => write!(f, "BitVector[{bits}]"),
            SszDef::BitList { max_bits } => write!(f, "BitList[{max_bits}]"),
            SszDef::Container { fields, .. } => write!(f, "Container({} fields)", fields.len()),
            SszDef::Union { variants } => write!(f, "Union({} variants)", variants.len()),
            SszDef::None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_size_vector_of_uint64() {
        let def = SszDef::vector(SszDef::uint(8), 4);
        assert!(def.is_fixed_size());
        assert_eq!(def.fixed_size(), Some(32));
    }

    #[test]
    fn list_is_never_fixed_size() {
        let def = SszDef::list(SszDef::uint(8), 4);
        assert!(!def.is_fixed_size());
        assert_eq!(def.fixed_size(), None);
    }

    #[test]
    fn container_fixed_iff_all_fields_fixed() {
        let fixed = SszDef::container(vec![
            FieldDef::new("slot", SszDef::uint(8)),
            FieldDef::new("root", SszDef::vector(SszDef::uint(1), 32)),
        ]);
        assert!(fixed.is_fixed_size());

        let variable = SszDef::container(vec![
            FieldDef::new("slot", SszDef::uint(8)),
            FieldDef::new("payload", SszDef::list(SszDef::uint(1), 64)),
        ]);
        assert!(!variable.is_fixed_size());
    }

    #[test]
    fn chunk_count_packs_small_basic_vectors() {
        // 512 8-byte uint64s pack 4-per-chunk -> 128 chunks.
        let def = SszDef::vector(SszDef::uint(8), 512);
        assert_eq!(def.chunk_count(None), 128);
        assert_eq!(depth_for_chunks(128), 7);
    }

    #[test]
    fn field_index_falls_back_to_snake_case() {
        let def = SszDef::container(vec![FieldDef::new("beaconBlockHeader", SszDef::uint(8))]);
        assert_eq!(def.field_index("beacon_block_header"), Some(0));
        assert_eq!(def.field_index("beaconBlockHeader"), Some(0));
    }
}
