//! Exact occurrence counting: how many times a fragment occurs anywhere
//! in a target treebank, maximal or not.
//!
//! # Overview
//! Approximate extraction only ever reports *maximal* occurrences
//! between the specific pair of trees a fragment was extracted from. An
//! intermediate fragment can still embed inside trees that were never
//! compared to each other directly, so exact counting is always a
//! separate pass (spec: "never try to compute exact counts during
//! initial extraction").
//!
//! For each fragment, the reverse production index narrows the set of
//! candidate trees before paying for a structural walk: a tree can only
//! contain the fragment if it contains every production the fragment's
//! non-terminal nodes use.

use crate::arena::{Ctrees, Node};
use crate::bitops;
use crate::error::{FragmentError, Result};
use crate::fragment::Fragment;
use std::collections::HashSet;

pub struct ExactOccurrenceCounter;

impl ExactOccurrenceCounter {
    /// Returns `(tree_id, multiplicity)` pairs, sorted by `tree_id`, for
    /// every target tree the fragment occurs in at least once. A
    /// fragment can occur more than once in the same tree (different
    /// anchors), hence the multiplicity rather than a boolean.
    pub fn count(fragment: &Fragment, source: &Ctrees, target: &Ctrees) -> Result<Vec<(u32, u32)>> {
        let a = source.nodes(fragment.source_tree as usize)?;
        let root = fragment.root as usize;
        if root >= a.len() {
            return Err(FragmentError::IndexOutOfRange { idx: root, len: a.len() });
        }

        let candidates = Self::candidate_trees(fragment, a, target);

        let mut hits: Vec<(u32, u32)> = Vec::new();
        for &tid in &candidates {
            let b = target.nodes(tid as usize)?;
            let mut count_in_tree = 0u32;
            for (j, bn) in b.iter().enumerate() {
                if bn.prod == a[root].prod && Self::contains(a, b, &fragment.bits, root, j) {
                    count_in_tree += 1;
                }
            }
            if count_in_tree > 0 {
                hits.push((tid, count_in_tree));
            }
        }
        hits.sort_by_key(|&(t, _)| t);
        Ok(hits)
    }

    /// Convenience: the scalar total across every target tree.
    pub fn count_scalar(fragment: &Fragment, source: &Ctrees, target: &Ctrees) -> Result<usize> {
        let hits = Self::count(fragment, source, target)?;
        Ok(hits.iter().map(|&(_, c)| c as usize).sum())
    }

    /// Intersects `target.treeswithprod` over every non-terminal
    /// production used by a set bit in the fragment, starting from the
    /// root. Terminal bits (production sentinel) never narrow the set,
    /// since the sentinel appears in every tree. If the fragment has no
    /// non-terminal bit at all (a bare single-terminal fragment), there
    /// is nothing to narrow by, so every target tree is a candidate.
    fn candidate_trees(fragment: &Fragment, a: &[Node], target: &Ctrees) -> Vec<u32> {
        let mut candidates: Option<HashSet<u32>> = None;
        for k in fragment.iter_set() {
            let k = k as usize;
            debug_assert!(k < a.len(), "fragment bit out of range of its source tree");
            let prod = a[k].prod;
            if prod < 0 {
                continue;
            }
            let set: HashSet<u32> = target.treeswithprod(prod).iter().copied().collect();
            candidates = Some(match candidates {
                None => set,
                Some(prev) => prev.intersection(&set).copied().collect(),
            });
        }
        let mut out: Vec<u32> = match candidates {
            Some(set) => set.into_iter().collect(),
            None => (0..target.len() as u32).collect(),
        };
        out.sort_unstable();
        out
    }

    /// Structural match of `a` rooted at `i` against `b` rooted at `j`,
    /// following only children whose bit is set in `bits`. An unset bit
    /// marks a frontier: any node with the right production there
    /// satisfies the match without looking deeper. A set bit on a
    /// terminal node also succeeds immediately once productions agree —
    /// the specific word is not re-verified (see the terminal-sentinel
    /// design note; word identity was never load-bearing for the
    /// kernel's notion of "common subtree" in this model).
    ///
    /// Both the left and right branch are checked explicitly rather than
    /// returning early the moment `a[i].right < 0`: a unary node's
    /// `right` must be `-1`, not merely negative, for the match to be
    /// structurally sound, so the right branch is asserted rather than
    /// silently skipped.
    fn contains(a: &[Node], b: &[Node], bits: &[u64], i: usize, j: usize) -> bool {
        let an = a[i];
        let bn = b[j];
        if an.prod != bn.prod {
            return false;
        }
        if !bitops::test(bits, i) {
            return true; // frontier: any matching-production node suffices.
        }
        if an.left < 0 {
            return true; // terminal fully inside the fragment.
        }

        debug_assert!(bn.left >= 0, "matched production must agree on arity");
        if !Self::contains(a, b, bits, an.left as usize, bn.left as usize) {
            return false;
        }

        if an.right >= 0 {
            debug_assert!(bn.right >= 0, "matched production must agree on arity");
            Self::contains(a, b, bits, an.right as usize, bn.right as usize)
        } else {
            debug_assert!(bn.right < 0, "matched production must agree on arity");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Node;

    /// Builds a corpus of `n` identical trees `(NP x)`, each contributing
    /// one occurrence of the `(NP x)` production.
    fn corpus_with_np_x(n: usize) -> Ctrees {
        let mut arena = Ctrees::alloc(n, n * 2);
        for _ in 0..n {
            arena.push(&[Node::terminal(0, 1), Node::unary(3, 0, 0)], 1);
        }
        arena.build_prod_index(4);
        arena
    }

    #[test]
    fn single_production_fragment_counts_every_occurrence() {
        let target = corpus_with_np_x(10);
        // Source tree is the same shape; fragment = whole (NP x) tree.
        let mut source = Ctrees::alloc(1, 2);
        source.push(&[Node::terminal(0, 1), Node::unary(3, 0, 0)], 1);

        let mut frag = Fragment::new(source.slots(), 1, 0);
        frag.set(0);
        frag.set(1);

        let total = ExactOccurrenceCounter::count_scalar(&frag, &source, &target).unwrap();
        assert_eq!(total, 10);
    }

    #[test]
    fn fragment_can_match_more_than_once_in_the_same_tree() {
        // Target: a tree with TWO separate (NP x) occurrences under an
        // unrelated root, e.g. (TOP (NP x) (NP x)).
        let mut target = Ctrees::alloc(1, 8);
        target.push(
            &[
                Node::terminal(0, 1), // 0
                Node::unary(3, 0, 0), // 1: NP -> x
                Node::terminal(0, 1), // 2
                Node::unary(3, 2, 0), // 3: NP -> x (same prod as node 1)
                Node::binary(9, 1, 3, 5), // 4: TOP -> NP NP
            ],
            4,
        );
        target.build_prod_index(10);

        let mut source = Ctrees::alloc(1, 2);
        source.push(&[Node::terminal(0, 1), Node::unary(3, 0, 0)], 1);

        let mut frag = Fragment::new(source.slots(), 1, 0);
        frag.set(0);
        frag.set(1);

        let hits = ExactOccurrenceCounter::count(&frag, &source, &target).unwrap();
        assert_eq!(hits, vec![(0, 2)]);
    }

    #[test]
    fn frontier_node_matches_regardless_of_its_subtree() {
        // Fragment: (S (NP ...) frontier-VP), i.e. root set, NP child
        // set + its terminal, VP child left UNSET (frontier).
        let mut source = Ctrees::alloc(1, 8);
        source.push(
            &[
                Node::terminal(0, 1),       // 0: "x"
                Node::unary(3, 0, 0),       // 1: NP -> x
                Node::terminal(1, 2),       // 2: "y"
                Node::unary(4, 2, 0),       // 3: VP -> y
                Node::binary(5, 1, 3, 6),   // 4: S -> NP VP
            ],
            4,
        );

        let mut frag = Fragment::new(source.slots(), 4, 0);
        frag.set(0);
        frag.set(1);
        frag.set(4);
        // bit 2, 3 (the VP subtree) left unset: VP is a frontier.

        // Target: same S/NP shape, but VP dominates a totally different
        // word ("z" instead of "y") — should still match since VP is a
        // frontier in the fragment.
        let mut target = Ctrees::alloc(1, 8);
        target.push(
            &[
                Node::terminal(0, 1),     // 0
                Node::unary(3, 0, 0),     // 1: NP -> x
                Node::terminal(5, 2),     // 2: "z"
                Node::unary(4, 2, 0),     // 3: VP -> z (same prod id 4, different word)
                Node::binary(5, 1, 3, 6), // 4: S -> NP VP
            ],
            4,
        );
        target.build_prod_index(6);

        let total = ExactOccurrenceCounter::count_scalar(&frag, &source, &target).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn no_occurrence_when_production_missing() {
        let target = corpus_with_np_x(3);
        let mut source = Ctrees::alloc(1, 2);
        source.push(&[Node::terminal(0, 1), Node::binary(99, 0, 0, 0)], 1);
        // a fragment rooted at an unused production should find nothing.
        let mut frag = Fragment::new(source.slots(), 1, 0);
        frag.set(0);
        frag.set(1);
        let total = ExactOccurrenceCounter::count_scalar(&frag, &source, &target).unwrap();
        assert_eq!(total, 0);
    }
}
