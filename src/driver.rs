//! Pair enumeration, sharding, and per-shard aggregation.
//!
//! # Overview
//! The driver is the only piece of this crate that knows about *pairs*
//! of trees; every other module operates on one tree, or one tree
//! against one already-built kernel matrix. [`run_shard`] owns the
//! per-pair pipeline end to end (kernel fill, extraction, optional
//! complement, rendering, aggregation) for a contiguous range of `T1`
//! tree ids against the whole of `T2`. Shards share nothing mutable, so
//! running them on separate `rayon` tasks and calling [`merge_shards`]
//! once every shard has finished is the whole concurrency story (spec:
//! "no cross-worker synchronisation during extraction").

use crate::arena::Ctrees;
use crate::bitops;
use crate::error::Result;
use crate::extract::{ComplementExtractor, MaximalExtractor};
use crate::fragment::Fragment;
use crate::kernel::{fast_tree_kernel, prods_of};
use crate::render;
use std::collections::{HashMap, HashSet};

/// A fragment's aggregation key: the rendered string, plus the
/// collapsed sentence tuple when the fragment is discontinuous. Two
/// fragments with the same key are the same fragment for histogram and
/// exact-mode purposes, independent of which tree pair produced them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FragmentKey {
    Continuous(String),
    Discontinuous(String, Vec<Option<String>>),
}

/// The driver's per-shard (and merged) result: either an approximate
/// histogram or, in exact mode, one representative bitset per distinct
/// fragment for a later [`crate::counts::ExactOccurrenceCounter`] pass.
pub enum FragmentTable {
    Histogram(HashMap<FragmentKey, u64>),
    Representative(HashMap<FragmentKey, Fragment>),
}

impl FragmentTable {
    fn new_for(cfg: &ExtractConfig) -> Self {
        if cfg.approx {
            FragmentTable::Histogram(HashMap::new())
        } else {
            FragmentTable::Representative(HashMap::new())
        }
    }

    fn record(&mut self, key: FragmentKey, fragment: Fragment) {
        match self {
            FragmentTable::Histogram(map) => {
                *map.entry(key).or_insert(0) += 1;
            }
            FragmentTable::Representative(map) => {
                map.entry(key).or_insert(fragment);
            }
        }
    }
}

/// Which `(n, m)` tree-id pairs a shard should extract from.
pub enum PairMode {
    /// `m > n` when `T2` is the same corpus as `T1`, else the full
    /// cross product.
    All,
    /// `(n, n + 1)` only.
    Adjacent,
    /// Select `m` from `T2` that shares at least one content-word
    /// production with `T1[n]` and at least one other lexical
    /// production, per spec's two-terminals filter.
    TwoTerminals { content_labels: HashSet<u32> },
}

/// A contiguous range of `T1` tree ids this worker is responsible for.
#[derive(Clone, Copy, Debug)]
pub struct Shard {
    pub offset: usize,
    pub end: usize,
}

/// Flags controlling the extraction pipeline itself, independent of
/// which pairs get compared. `twoterms`/`adjacent` mirror the CLI flags
/// of the same name (spec §6) and are not consulted by `run_shard`
/// directly — they exist so a caller building `ExtractConfig` and
/// `PairMode` from the same parsed flags doesn't need a second struct.
pub struct ExtractConfig {
    pub approx: bool,
    pub discontinuous: bool,
    pub complement: bool,
    pub twoterms: bool,
    pub adjacent: bool,
    pub minterms: usize,
}

impl ExtractConfig {
    /// `minterms` defaults to 2 when `twoterms` is set, else 0, matching
    /// spec §4.4's stated default.
    pub fn new(approx: bool, discontinuous: bool, complement: bool, twoterms: bool, adjacent: bool) -> Self {
        ExtractConfig {
            approx,
            discontinuous,
            complement,
            twoterms,
            adjacent,
            minterms: if twoterms { 2 } else { 0 },
        }
    }
}

/// Returns the candidate `T2` tree ids for source tree `n`, under the
/// given pair-selection mode. `same_corpus` suppresses the mirrored
/// `(m, n)` pair and self-pairing when `T1` and `T2` are the same
/// treebank, for every mode (not just `All`) — comparing a tree against
/// itself or against a pair already covered from the other direction
/// produces no new fragments that a later pass wouldn't already emit.
fn candidates_for(
    mode: &PairMode,
    n: usize,
    t1: &Ctrees,
    t2: &Ctrees,
    same_corpus: bool,
) -> Result<Vec<usize>> {
    let t2_len = t2.len();
    match mode {
        PairMode::All => {
            let start = if same_corpus { n + 1 } else { 0 };
            Ok((start..t2_len).collect())
        }
        PairMode::Adjacent => {
            if n + 1 < t2_len {
                Ok(vec![n + 1])
            } else {
                Ok(Vec::new())
            }
        }
        PairMode::TwoTerminals { content_labels } => {
            let a = t1.nodes(n)?;
            let mut candidates = two_terminal_candidates(a, content_labels, t2);
            if same_corpus {
                candidates.retain(|&m| m > n);
            }
            Ok(candidates)
        }
    }
}

/// Spec §4.8's two-terminals filter: a node is "lexical" when it is a
/// unary preterminal dominating a single terminal; "content" lexical
/// nodes are the subset whose label is in `content_labels`. For every
/// `(content, other-lexical)` pair in `a`, intersect their per-production
/// candidate-tree sets in `target` and union the results.
fn two_terminal_candidates(a: &[crate::arena::Node], content_labels: &HashSet<u32>, target: &Ctrees) -> Vec<u32> {
    let lexical: Vec<usize> = (0..a.len())
        .filter(|&k| a[k].is_unary() && a[a[k].left as usize].is_terminal())
        .collect();

    let mut result: HashSet<u32> = HashSet::new();
    for &i in &lexical {
        if !content_labels.contains(&a[i].label) {
            continue;
        }
        let si: HashSet<u32> = target.treeswithprod(a[i].prod).iter().copied().collect();
        for &j in &lexical {
            if i == j {
                continue;
            }
            let sj: HashSet<u32> = target.treeswithprod(a[j].prod).iter().copied().collect();
            result.extend(si.intersection(&sj).copied());
        }
    }
    let mut out: Vec<u32> = result.into_iter().collect();
    out.sort_unstable();
    out
}

/// Runs the full extraction pipeline for every pair `(n, m)` with `n` in
/// `shard` and `m` selected by `mode`, against `t1`/`t2`. `labels` is the
/// shared label table (spec: `labels[p]` is a production's lhs label,
/// indexed here by node label id instead); `sents1` holds one sentence
/// per `T1` tree, needed to render continuous fragments and to collapse
/// discontinuous ones via [`render::get_sent`].
pub fn run_shard(
    t1: &Ctrees,
    t2: &Ctrees,
    shard: Shard,
    mode: &PairMode,
    cfg: &ExtractConfig,
    labels: &[String],
    sents1: &[Vec<Option<String>>],
    same_corpus: bool,
) -> Result<FragmentTable> {
    let mut table = FragmentTable::new_for(cfg);

    for n in shard.offset..shard.end.min(t1.len()) {
        let a = t1.nodes(n)?;
        let a_root = t1.tree(n)?.root;
        let aprods = prods_of(a);
        let slots = bitops::slots_for(a.len().saturating_sub(1));
        let sentence = sents1.get(n).map(Vec::as_slice).unwrap_or(&[]);

        for m in candidates_for(mode, n, t1, t2, same_corpus)? {
            let b = t2.nodes(m)?;
            let b_root = t2.tree(m)?.root;
            let bprods = prods_of(b);

            let mut matrix = vec![0u64; b.len() * slots];
            fast_tree_kernel(&aprods, &bprods, slots, &mut matrix);

            let mut extractor = MaximalExtractor::new(a, b, &mut matrix, slots);
            let mut fragments = extractor.extract_bitsets(b_root, cfg.minterms, n as u32);

            if cfg.complement {
                let mut union = vec![0u64; slots];
                for f in &fragments {
                    bitops::union_in_place(&mut union, &f.bits);
                }
                let complement = ComplementExtractor::new(a, &union, slots);
                fragments.extend(complement.extract(a_root, n as u32));
            }

            for fragment in fragments {
                let key = if cfg.discontinuous {
                    let raw = render::render_discontinuous(&fragment, a, labels);
                    let (collapsed, sent) = render::get_sent(&raw, sentence);
                    FragmentKey::Discontinuous(collapsed, sent)
                } else {
                    FragmentKey::Continuous(render::render_continuous(&fragment, a, labels, sentence))
                };
                table.record(key, fragment);
            }
        }

        log::debug!("driver: tree {n} of shard [{}, {}) done", shard.offset, shard.end);
    }

    Ok(table)
}

/// Multiset-adds a set of independently computed shard results. All
/// tables must be the same variant (every shard in one run shares one
/// `ExtractConfig`, so this always holds in practice); mixing variants
/// drops the mismatched table's contribution rather than panicking,
/// since a driver bug here should degrade gracefully, not take down a
/// whole merge.
pub fn merge_shards(tables: Vec<FragmentTable>) -> FragmentTable {
    let mut iter = tables.into_iter();
    let Some(first) = iter.next() else {
        return FragmentTable::Histogram(HashMap::new());
    };

    match first {
        FragmentTable::Histogram(mut acc) => {
            for table in iter {
                if let FragmentTable::Histogram(map) = table {
                    for (key, count) in map {
                        *acc.entry(key).or_insert(0) += count;
                    }
                }
            }
            FragmentTable::Histogram(acc)
        }
        FragmentTable::Representative(mut acc) => {
            for table in iter {
                if let FragmentTable::Representative(map) = table {
                    for (key, fragment) in map {
                        acc.entry(key).or_insert(fragment);
                    }
                }
            }
            FragmentTable::Representative(acc)
        }
    }
}
