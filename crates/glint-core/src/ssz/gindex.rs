use super::SszError;

/// A generalized index: the position of a node in a conceptually complete
/// binary Merkle tree, root at `1`, left child `2*g`, right child `2*g+1`
/// (§4.1, GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gindex(pub u64);

impl Gindex {
    pub const ROOT: Gindex = Gindex(1);

    pub fn new(g: u64) -> Self {
        Gindex(g)
    }

    pub fn left(self) -> Gindex {
        Gindex(self.0 * 2)
    }

    pub fn right(self) -> Gindex {
        Gindex(self.0 * 2 + 1)
    }

    pub fn parent(self) -> Option<Gindex> {
        if self.0 <= 1 {
            None
        } else {
            Some(Gindex(self.0 / 2))
        }
    }

    /// `true` if this is the right child of its parent (the bit that
    /// decides, during proof verification, whether a sibling hashes on the
    /// left or the right).
    pub fn is_right_child(self) -> bool {
        self.0 % 2 == 1
    }

    /// Depth of this node below the root, i.e. `floor(log2(g))`.
    pub fn depth(self) -> u32 {
        64 - self.0.leading_zeros() - 1
    }

    /// Compose an `outer` gindex (position of a subtree's root within a
    /// larger tree) with an `inner` gindex (position within that subtree)
    /// into a single gindex in the larger tree's numbering.
    ///
    /// `add(outer, inner) = outer * 2^depth(inner) + (inner - 2^depth(inner))`,
    /// equivalently the inner path's bits appended below the outer path's
    /// bits. Satisfies `add(1, x) == x` for all `x` since depth(1)==0 makes
    /// the outer contribution a no-op shift.
    pub fn add(outer: Gindex, inner: Gindex) -> Result<Gindex, SszError> {
        if outer.0 == 0 || inner.0 == 0 {
            return Err(SszError::InvalidGindex);
        }
        let inner_depth = inner.depth();
        let inner_offset = inner.0 - (1u64 << inner_depth);
        let combined = outer
            .0
            .checked_shl(inner_depth)
            .and_then(|v| v.checked_add(inner_offset))
            .ok_or(SszError::InvalidGindex)?;
        Ok(Gindex(combined))
    }

    /// Walk from this gindex up to the root, yielding the gindex of each
    /// sibling needed to recompute the root hash, in root-to-leaf... no,
    /// leaf-to-root order (the order `hash_tree_root`'s single-proof
    /// verifier folds them in).
    pub fn sibling_path(self) -> Vec<Gindex> {
        let mut path = Vec::new();
        let mut g = self.0;
        while g > 1 {
            path.push(Gindex(g ^ 1));
            g /= 2;
        }
        path
    }
}

impl From<u64> for Gindex {
    fn from(g: u64) -> Self {
        Gindex(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_with_root_outer_is_identity() {
        for inner in [1u64, 2, 3, 7, 55, 105, 8191] {
            let g = Gindex::add(Gindex::ROOT, Gindex(inner)).unwrap();
            assert_eq!(g.0, inner);
        }
    }

    #[test]
    fn add_composes_depths() {
        // outer = 2 (left child of root), inner = 3 (right child of its
        // root) should land at 2*2+1 = 5.
        let g = Gindex::add(Gindex(2), Gindex(3)).unwrap();
        assert_eq!(g.0, 5);
    }

    #[test]
    fn depth_matches_known_gindices() {
        assert_eq!(Gindex(1).depth(), 0);
        assert_eq!(Gindex(2).depth(), 1);
        assert_eq!(Gindex(3).depth(), 1);
        assert_eq!(Gindex(55).depth(), 5);
        assert_eq!(Gindex(105).depth(), 6);
    }

    #[test]
    fn sibling_path_reaches_root() {
        let path = Gindex(55).sibling_path();
        assert_eq!(path.len(), 5);
        // Folding the path length back up from depth 5 should reach gindex 1.
        let mut g = 55u64;
        for _ in 0..path.len() {
            g /= 2;
        }
        assert_eq!(g, 1);
    }

    #[test]
    fn is_right_child_matches_parity() {
        assert!(!Gindex(2).is_right_child());
        assert!(Gindex(3).is_right_child());
        assert!(Gindex(105).is_right_child());
    }
}
