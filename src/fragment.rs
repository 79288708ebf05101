//! The bitset representation of an extracted tree fragment.
//!
//! # Overview
//! A [`Fragment`] is a bitset over the nodes of one source tree, plus a
//! trailer identifying which tree it came from and the fragment's root.
//! A set bit means "this node's subtree is fully inside the fragment";
//! an unset child of a set node is a *frontier* non-terminal — its own
//! subtree is not included, so it renders as a labelled leaf instead of
//! being expanded.
//!
//! Unlike the teacher's `Bitset`, which packs as a flat `Vec<u64>` with
//! no metadata, `Fragment` keeps the trailer (`root`, `source_tree`) as
//! explicit fields rather than appended bitset words — simpler to reason
//! about, and it lets `Hash`/`Eq` choose whether `source_tree` matters
//! (it doesn't, for histogram keys; it does, for exact counting).

use crate::bitops;
use std::hash::{Hash, Hasher};

/// A connected subset of one tree's nodes, with its root and originating
/// tree id.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub bits: Vec<u64>,
    pub root: i16,
    pub source_tree: u32,
}

impl Fragment {
    pub fn new(slots: usize, root: i16, source_tree: u32) -> Self {
        Fragment {
            bits: vec![0u64; slots],
            root,
            source_tree,
        }
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        bitops::set(&mut self.bits, idx);
    }

    #[inline]
    pub fn clear(&mut self, idx: usize) {
        bitops::clear(&mut self.bits, idx);
    }

    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        bitops::test(&self.bits, idx)
    }

    #[inline]
    pub fn count_ones(&self) -> usize {
        bitops::popcount(&self.bits)
    }

    pub fn iter_set(&self) -> bitops::BitIter<'_> {
        bitops::iter_set(&self.bits)
    }
}

/// Two fragments are equal, for the purposes of histogram/result-map
/// keys, iff their node sets are equal — the originating tree and root
/// do not matter once the fragment has been reduced to "which shape
/// occurred." Exact counting cares about `source_tree`/`root` too, but
/// reaches for them as plain fields rather than through this impl.
impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}
impl Eq for Fragment {}

impl Hash for Fragment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}
