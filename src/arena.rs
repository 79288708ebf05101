//! Contiguous storage for many small binarized trees.
//!
//! # Overview
//! A [`Ctrees`] is an append-only pool of [`Node`]s plus an ordered list
//! of [`NodeArray`] slices describing where each ingested tree's nodes
//! live. Nodes are stored in *canonical order*: sorted by production id
//! ascending, with every terminal-type node sorting first (its
//! production id is always the sentinel [`TERMINAL_PROD`]). That
//! ordering is the only precondition the fast tree kernel needs to run
//! its two-pointer merge.
//!
//! # Node encoding
//! A [`Node`] represents one position in a binarized tree, internal or
//! leaf alike:
//! - `left < 0` marks a terminal: the word's position in the sentence is
//!   `-left - 1`, and `right` is unused.
//! - `right < 0` (with `left >= 0`) marks a unary non-terminal: the node
//!   has exactly one child, `left`.
//! - Otherwise both `left` and `right` are local child indices within the
//!   same tree's slice.

use crate::error::{FragmentError, Result};

/// Sentinel production id assigned to every terminal-type node so that
/// terminals always sort before every real (non-negative) production id
/// during canonicalization.
pub const TERMINAL_PROD: i32 = -1;

/// One position in a binarized tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    /// Production id: `TERMINAL_PROD` for terminal-type nodes, otherwise
    /// a non-negative id identifying the `(lhs, rhs...)` rewrite.
    pub prod: i32,
    /// Local child index, or a negative terminal encoding (`-pos - 1`).
    pub left: i16,
    /// Local child index, or `-1` for a unary node or a terminal.
    pub right: i16,
    /// Index into the label table.
    pub label: u32,
}

impl Node {
    pub fn terminal(position: usize, label: u32) -> Self {
        Node {
            prod: TERMINAL_PROD,
            left: -((position as i32) + 1) as i16,
            right: -1,
            label,
        }
    }

    pub fn unary(prod: i32, child: i16, label: u32) -> Self {
        Node {
            prod,
            left: child,
            right: -1,
            label,
        }
    }

    pub fn binary(prod: i32, left: i16, right: i16, label: u32) -> Self {
        Node {
            prod,
            left,
            right,
            label,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.left < 0
    }

    #[inline]
    pub fn is_unary(&self) -> bool {
        !self.is_terminal() && self.right < 0
    }

    /// The terminal's position in the sentence, if this node is one.
    #[inline]
    pub fn terminal_index(&self) -> Option<usize> {
        if self.left < 0 {
            Some((-(self.left as i32) - 1) as usize)
        } else {
            None
        }
    }
}

/// A view into the arena's node pool: one tree's nodes and its root.
#[derive(Clone, Copy, Debug)]
pub struct NodeArray {
    /// Offset into the global node pool.
    pub offset: usize,
    /// Number of nodes belonging to this tree.
    pub len: usize,
    /// Root index, local to this tree's slice.
    pub root: usize,
}

/// Append-only pool of [`Node`]s plus the ordered sequence of
/// [`NodeArray`]s describing each ingested tree.
pub struct Ctrees {
    pool: Vec<Node>,
    trees: Vec<NodeArray>,
    maxnodes: usize,
    treeswithprod: Vec<Vec<u32>>,
}

impl Ctrees {
    /// Reserves capacity for roughly `trees_hint` trees totalling
    /// `nodes_hint` nodes.
    pub fn alloc(trees_hint: usize, nodes_hint: usize) -> Self {
        Ctrees {
            pool: Vec::with_capacity(nodes_hint),
            trees: Vec::with_capacity(trees_hint),
            maxnodes: 0,
            treeswithprod: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn maxnodes(&self) -> usize {
        self.maxnodes
    }

    /// Number of 64-bit words a fragment bitset over this arena's trees
    /// needs: `ceil((maxnodes + 1) / 64)`.
    pub fn slots(&self) -> usize {
        crate::bitops::slots_for(self.maxnodes)
    }

    pub fn tree(&self, tree_id: usize) -> Result<&NodeArray> {
        self.trees
            .get(tree_id)
            .ok_or(FragmentError::IndexOutOfRange {
                idx: tree_id,
                len: self.trees.len(),
            })
    }

    pub fn nodes(&self, tree_id: usize) -> Result<&[Node]> {
        let ta = self.tree(tree_id)?;
        Ok(&self.pool[ta.offset..ta.offset + ta.len])
    }

    pub fn treeswithprod(&self, prod: i32) -> &[u32] {
        if prod < 0 {
            return &[];
        }
        self.treeswithprod
            .get(prod as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reserves additional pool capacity using the arena's geometric
    /// growth factor (`capacity * 1.125 + 6`) rather than leaving it to
    /// `Vec`'s default strategy, matching the documented invariant that
    /// growth is infrequent and over-allocates a little up front.
    fn grow_pool_for(&mut self, additional: usize) {
        let needed = self.pool.len() + additional;
        if needed > self.pool.capacity() {
            let grown = (self.pool.capacity() * 1125 / 1000) + 6;
            let target = grown.max(needed);
            self.pool.reserve(target - self.pool.len());
        }
    }

    /// Appends `nodes` (already in canonical order, with local child
    /// indices already valid) as a new tree and returns its id.
    pub fn push(&mut self, nodes: &[Node], root: usize) -> u32 {
        self.grow_pool_for(nodes.len());
        let offset = self.pool.len();
        self.pool.extend_from_slice(nodes);
        let len = nodes.len();
        self.maxnodes = self.maxnodes.max(len);
        self.trees.push(NodeArray { offset, len, root });
        (self.trees.len() - 1) as u32
    }

    /// Canonicalizes `nodes` (sorts by production, terminal-sentinel
    /// lowest, remapping child indices through the resulting
    /// permutation) and appends the result as a new tree.
    ///
    /// Sorting and remapping happen on a local staging buffer; the arena
    /// itself is only touched once the permutation is known, so a
    /// malformed `root` (out of bounds) never leaves a partially-written
    /// tree behind.
    pub fn push_from_nodes(&mut self, nodes: Vec<Node>, root: usize) -> Result<u32> {
        if root >= nodes.len() {
            return Err(FragmentError::MalformedTree(format!(
                "root index {root} out of range for {} nodes",
                nodes.len()
            )));
        }
        let (sorted, root_new) = canonicalize(nodes, root);
        Ok(self.push(&sorted, root_new))
    }

    /// Builds the per-production reverse index `treeswithprod[p] = {
    /// tree indices containing production p }`. `num_prods` must be at
    /// least one past the highest non-terminal production id used by any
    /// ingested tree.
    pub fn build_prod_index(&mut self, num_prods: usize) {
        let mut idx: Vec<Vec<u32>> = vec![Vec::new(); num_prods];
        for (tree_id, ta) in self.trees.iter().enumerate() {
            let slice = &self.pool[ta.offset..ta.offset + ta.len];
            for node in slice {
                if node.prod < 0 {
                    continue;
                }
                let p = node.prod as usize;
                if p >= idx.len() {
                    idx.resize(p + 1, Vec::new());
                }
                if idx[p].last().copied() != Some(tree_id as u32) {
                    idx[p].push(tree_id as u32);
                }
            }
        }
        self.treeswithprod = idx;
    }
}

/// Sorts `nodes` by production ascending (terminals sentinel-lowest,
/// ties broken by original index for stability) and rewrites every local
/// child index to point at the new positions. Returns the reordered
/// nodes and the new index of `root`.
fn canonicalize(nodes: Vec<Node>, root: usize) -> (Vec<Node>, usize) {
    let n = nodes.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| nodes[a].prod.cmp(&nodes[b].prod).then(a.cmp(&b)));

    // perm[old_idx] = new_idx
    let mut perm = vec![0i16; n];
    for (new_idx, &old_idx) in order.iter().enumerate() {
        perm[old_idx] = new_idx as i16;
    }

    let remap_child = |x: i16| -> i16 {
        if x < 0 {
            x
        } else {
            perm[x as usize]
        }
    };

    let sorted: Vec<Node> = order
        .iter()
        .map(|&old_idx| {
            let node = nodes[old_idx];
            if node.is_terminal() {
                node
            } else {
                Node {
                    left: remap_child(node.left),
                    right: if node.right < 0 {
                        node.right
                    } else {
                        remap_child(node.right)
                    },
                    ..node
                }
            }
        })
        .collect();

    (sorted, perm[root] as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(pos: usize) -> Node {
        Node::terminal(pos, 0)
    }

    #[test]
    fn node_accessors() {
        let t = Node::terminal(2, 5);
        assert!(t.is_terminal());
        assert!(!t.is_unary());
        assert_eq!(t.terminal_index(), Some(2));

        let u = Node::unary(3, 0, 1);
        assert!(!u.is_terminal());
        assert!(u.is_unary());

        let b = Node::binary(4, 0, 1, 2);
        assert!(!b.is_terminal());
        assert!(!b.is_unary());
    }

    #[test]
    fn push_records_offset_len_root() {
        let mut arena = Ctrees::alloc(2, 8);
        let nodes = vec![Node::binary(0, 1, 2, 0), leaf(0), leaf(1)];
        let id = arena.push(&nodes, 0);
        assert_eq!(id, 0);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.maxnodes(), 3);
        let ta = arena.tree(0).unwrap();
        assert_eq!(ta.offset, 0);
        assert_eq!(ta.len, 3);
        assert_eq!(ta.root, 0);
        assert_eq!(arena.nodes(0).unwrap().len(), 3);
    }

    #[test]
    fn push_from_nodes_canonicalizes_and_remaps() {
        // Root at index 0 has children at 1 (terminal) and 2 (terminal),
        // built out of canonical order on purpose: prod descending.
        let mut arena = Ctrees::alloc(1, 8);
        let nodes = vec![
            Node::binary(5, 1, 2, 0), // root, prod 5 (highest, should sort last)
            leaf(0),                  // prod = -1 (sentinel, sorts first)
            leaf(1),                  // prod = -1
        ];
        let id = arena.push_from_nodes(nodes, 0).unwrap();
        let slice = arena.nodes(id as usize).unwrap();
        // terminals (prod -1) sort before the prod-5 root.
        assert_eq!(slice[0].prod, TERMINAL_PROD);
        assert_eq!(slice[1].prod, TERMINAL_PROD);
        assert_eq!(slice[2].prod, 5);
        // root is now last, pointing at the first two (remapped) slots.
        let ta = arena.tree(id as usize).unwrap();
        assert_eq!(ta.root, 2);
        assert_eq!(slice[2].left, 0);
        assert_eq!(slice[2].right, 1);
    }

    #[test]
    fn push_from_nodes_rejects_bad_root() {
        let mut arena = Ctrees::alloc(1, 8);
        let nodes = vec![leaf(0)];
        assert!(arena.push_from_nodes(nodes, 5).is_err());
    }

    #[test]
    fn build_prod_index_dedupes_per_tree() {
        let mut arena = Ctrees::alloc(2, 8);
        // Tree 0: two nodes with the same production 7.
        arena.push(&[Node::binary(7, 1, 2, 0), leaf(0), leaf(1)], 0);
        // Tree 1: one node with production 7.
        arena.push(&[Node::binary(7, 1, 2, 0), leaf(0), leaf(1)], 0);
        arena.build_prod_index(8);
        assert_eq!(arena.treeswithprod(7), &[0, 1]);
        assert_eq!(arena.treeswithprod(3), &[] as &[u32]);
        assert_eq!(arena.treeswithprod(TERMINAL_PROD), &[] as &[u32]);
    }

    #[test]
    fn geometric_growth_does_not_lose_nodes() {
        let mut arena = Ctrees::alloc(0, 0);
        for i in 0..200 {
            arena.push(&[leaf(i)], 0);
        }
        assert_eq!(arena.len(), 200);
        assert_eq!(arena.nodes(199).unwrap()[0].terminal_index(), Some(199));
    }
}
