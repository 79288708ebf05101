//! Crate-wide error type.
//!
//! Mirrors the error kinds from the fragment-extraction design: a
//! malformed tree aborts only that tree, everything else is fatal for
//! the worker that hit it. Diagnostics that belong to an external
//! grammar collaborator (production sum-to-one checks, label
//! consistency) are not modeled here — they are not this crate's
//! failures to report.

use thiserror::Error;

/// Errors produced while ingesting, extracting from, or rendering
/// treebanks.
#[derive(Debug, Error)]
pub enum FragmentError {
    /// Unbalanced parens, a missing label, or a non-binarized node with
    /// more than two children. Fatal for the offending tree only; the
    /// reader continues with the rest of the file.
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    /// A candidate tree id fell outside `[0, len)`. This only happens if
    /// a pair-selection strategy supplies a bad index, which is a
    /// programmer error, not recoverable input data.
    #[error("tree index {idx} out of range (treebank has {len} trees)")]
    IndexOutOfRange { idx: usize, len: usize },

    /// A scratch buffer (matrix, bitset) could not be sized as required.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// Propagated from reading a treebank file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FragmentError>;
