//! Tree fragment extraction over binarized phrase-structure treebanks.
//!
//! Modules, leaves first:
//! - `bitops`: fixed-width bitset primitives over `&[u64]` slices.
//! - `arena`: packed treebank storage (`Node`, `NodeArray`, `Ctrees`) with
//!   the per-production reverse index.
//! - `fragment`: the bitset representation of one extracted fragment.
//! - `kernel`: the fast tree kernel building a common-production matrix.
//! - `extract`: maximal and complement fragment extraction.
//! - `counts`: exact occurrence counting over a target treebank.
//! - `render`: bracket-string rendering and discontinuous-gap collapsing.
//! - `driver`: pair enumeration, sharding, and result aggregation.
//! - `io`: bracket-tree parsing and fragment-count table output.
//! - `error`: the crate-wide error type.
//! - `api`: Python bindings via `pyo3` (gated behind the "python" feature).
//!
//! Public API kept stable by re-exporting the most commonly used types.

pub mod arena;
pub mod bitops;
pub mod counts;
pub mod driver;
pub mod error;
pub mod extract;
pub mod fragment;
pub mod io;
pub mod kernel;
pub mod render;

#[cfg(feature = "python")]
pub mod api;

pub use arena::{Ctrees, Node, NodeArray};
pub use driver::{ExtractConfig, FragmentKey, FragmentTable, PairMode, Shard};
pub use error::{FragmentError, Result};
pub use fragment::Fragment;
pub use io::Ingest;
