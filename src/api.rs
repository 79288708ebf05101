//! Python binding layer for tree fragment extraction.
//!
//! Exposes the same pipeline the CLI drives — `Ingest::read_bracket_trees`
//! -> `Ctrees` -> `driver::run_shard` -> optional
//! `ExactOccurrenceCounter` — as a single `pyo3` function, so a caller
//! working from Python gets the identical fragment set and counts the
//! binary would have written to its TSV output.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::prelude::*;
use std::collections::HashSet;

use crate::arena::Ctrees;
use crate::counts::ExactOccurrenceCounter;
use crate::driver::{self, ExtractConfig, FragmentKey, FragmentTable, PairMode, Shard};
use crate::io::Ingest;

fn default_content_labels() -> Vec<String> {
    ["NN", "NNS", "NNP", "JJ", "RB", "VB", "VBZ", "VBP", "VBD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Parses `lines` (one bracket tree per element) through `ingest`,
/// returning the packed arena plus one sentence per successfully-parsed
/// tree. A malformed tree fails the whole call — unlike the CLI, which
/// skips bad lines and keeps going, a library caller gets a single
/// Python exception naming the offending input rather than a silent
/// partial result.
fn ingest_lines(
    ingest: &mut Ingest,
    lines: &[String],
    which: &str,
    discontinuous: bool,
) -> PyResult<(Ctrees, Vec<Vec<Option<String>>>)> {
    let mut arena = Ctrees::alloc(lines.len(), lines.len() * 8);
    let mut sents = Vec::with_capacity(lines.len());
    let joined = lines.join("\n");
    let results = if discontinuous {
        ingest.read_discbracket_trees(&joined)
    } else {
        ingest.read_bracket_trees(&joined)
    };
    for result in results {
        let (nodes, root, sentence) = result.map_err(|e| PyValueError::new_err(format!("malformed tree in {which}: {e}")))?;
        arena
            .push_from_nodes(nodes, root)
            .map_err(|e| PyValueError::new_err(format!("malformed tree in {which}: {e}")))?;
        sents.push(sentence);
    }
    if arena.is_empty() {
        return Err(PyValueError::new_err(format!("no trees parsed from {which}")));
    }
    Ok((arena, sents))
}

fn key_to_string(key: FragmentKey) -> String {
    match key {
        FragmentKey::Continuous(s) => s,
        FragmentKey::Discontinuous(s, sentence) => {
            let words: Vec<String> = sentence.into_iter().map(|w| w.unwrap_or_else(|| "_".to_string())).collect();
            format!("{s} ||| {}", words.join(" "))
        }
    }
}

fn finalize_table(table: FragmentTable, t1: &Ctrees, t2: &Ctrees) -> PyResult<Vec<(String, u64)>> {
    match table {
        FragmentTable::Histogram(map) => Ok(map.into_iter().map(|(k, c)| (key_to_string(k), c)).collect()),
        FragmentTable::Representative(map) => Ok(map
            .into_par_iter()
            .filter_map(|(key, fragment)| {
                ExactOccurrenceCounter::count_scalar(&fragment, t1, t2)
                    .ok()
                    .map(|n| (key_to_string(key), n as u64))
            })
            .collect()),
    }
}

/// Extracts recurring tree fragments from one or two bracketed treebanks.
///
/// Args:
///     trees1: bracket-tree lines for T1, one tree per string
///     trees2: optional bracket-tree lines for T2; defaults to T1 itself
///     approx: emit an approximate per-pair histogram instead of exact
///         occurrence counts over the whole of T2 (default: True)
///     discontinuous: render fragments with collapsed-gap terminal indices
///         instead of literal tokens (default: False)
///     complement: also emit the complement of every pair's maximal
///         fragments (default: False)
///     twoterms: restrict candidate pairs to the two-terminals
///         content-word filter (default: False)
///     adjacent: restrict candidate pairs to (n, n + 1) only (default: False)
///     content_labels: content-word labels used by `twoterms`; defaults to
///         a standard English POS set
///     offset: shard start over T1, inclusive (default: 0)
///     end: shard end over T1, exclusive; defaults to the whole of T1
///
/// Returns:
///     A list of (fragment_key, count) pairs. In discontinuous mode the
///     key embeds the collapsed sentence as `"<bracket> ||| <tokens>"`.
///
/// Raises:
///     ValueError: if a treebank has no parseable trees, or any tree is malformed
#[pyfunction]
#[pyo3(signature = (
    trees1,
    trees2=None,
    approx=true,
    discontinuous=false,
    complement=false,
    twoterms=false,
    adjacent=false,
    content_labels=None,
    offset=0,
    end=None
))]
#[allow(clippy::too_many_arguments)]
fn extract_fragments(
    trees1: Vec<String>,
    trees2: Option<Vec<String>>,
    approx: bool,
    discontinuous: bool,
    complement: bool,
    twoterms: bool,
    adjacent: bool,
    content_labels: Option<Vec<String>>,
    offset: usize,
    end: Option<usize>,
) -> PyResult<Vec<(String, u64)>> {
    let mut ingest = Ingest::new();
    let same_corpus = trees2.is_none();

    let (mut t1, sents1) = ingest_lines(&mut ingest, &trees1, "trees1", discontinuous)?;
    let mut t2 = Ctrees::alloc(0, 0);
    if let Some(lines) = &trees2 {
        let (arena, _sents2) = ingest_lines(&mut ingest, lines, "trees2", discontinuous)?;
        t2 = arena;
    }

    t1.build_prod_index(ingest.productions.len());
    if !same_corpus {
        t2.build_prod_index(ingest.productions.len());
    }
    let t2_ref: &Ctrees = if same_corpus { &t1 } else { &t2 };

    let labels_wanted = content_labels.unwrap_or_else(default_content_labels);
    let content_label_ids: HashSet<u32> = labels_wanted.iter().map(|s| ingest.labels.intern(s.trim())).collect();

    let mode = if adjacent {
        PairMode::Adjacent
    } else if twoterms {
        PairMode::TwoTerminals { content_labels: content_label_ids }
    } else {
        PairMode::All
    };
    let cfg = ExtractConfig::new(approx, discontinuous, complement, twoterms, adjacent);

    let shard = Shard {
        offset: offset.min(t1.len()),
        end: end.unwrap_or(t1.len()).min(t1.len()),
    };
    let labels = ingest.labels.as_slice();
    let table = driver::run_shard(&t1, t2_ref, shard, &mode, &cfg, labels, &sents1, same_corpus)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    finalize_table(table, &t1, t2_ref)
}

/// Python module definition.
#[pymodule]
fn tree_fragments(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(extract_fragments, m)?)?;
    Ok(())
}
