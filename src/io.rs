//! Bracket-tree reading and label/production interning.
//!
//! # Overview
//! [`Ingest`] owns the two tables that must stay consistent across an
//! entire run: the label table (non-terminal and leaf label strings) and
//! the production table (the `(lhs, rhs...)` tuples the arena keys
//! fragments on). Both are append-only for the lifetime of an `Ingest` —
//! reading a second treebank through the same `Ingest` shares ids with
//! the first, which is what lets `Ctrees::treeswithprod` mean the same
//! thing across `T1` and `T2`.
//!
//! [`Ingest::read_bracket_trees`] and [`Ingest::read_discbracket_trees`]
//! parse the Penn-style bracket format: one tree per non-empty line,
//! single-space-separated label and children, already binarized. Which
//! one to call is a property of the corpus, not of any individual leaf
//! token — a continuous treebank's leaves are always literal words, a
//! discontinuous one's are always explicit gap indices, and the two are
//! never mixed within one file. A malformed line produces an `Err` in
//! its slot without aborting the rest of the file.

use crate::arena::Node;
use crate::error::{FragmentError, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Interns label strings to small integer ids.
#[derive(Default)]
pub struct LabelTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    pub fn intern(&mut self, label: &str) -> u32 {
        if let Some(&id) = self.index.get(label) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(label.to_string());
        self.index.insert(label.to_string(), id);
        id
    }

    pub fn get(&self, id: u32) -> &str {
        &self.strings[id as usize]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.strings
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Interns `(lhs_label, rhs_labels...)` tuples to production ids,
/// assigned in first-seen order, global for the lifetime of one
/// [`Ingest`].
#[derive(Default)]
pub struct ProductionTable {
    index: HashMap<Vec<u32>, i32>,
    count: i32,
}

impl ProductionTable {
    pub fn new() -> Self {
        ProductionTable::default()
    }

    pub fn intern(&mut self, key: Vec<u32>) -> i32 {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.count;
        self.count += 1;
        self.index.insert(key, id);
        id
    }

    /// One past the highest id assigned so far — the `num_prods` bound
    /// `Ctrees::build_prod_index` needs.
    pub fn len(&self) -> usize {
        self.count as usize
    }
}

/// One parsed tree: its nodes in parse order, the root index, and the
/// literal words collected from continuous-format leaves (`None` at
/// positions that were given as bare discontinuous indices rather than
/// literal tokens).
pub type ParsedTree = (Vec<Node>, usize, Vec<Option<String>>);

/// Owns the label/production tables shared across every treebank read
/// in one run.
#[derive(Default)]
pub struct Ingest {
    pub labels: LabelTable,
    pub productions: ProductionTable,
}

impl Ingest {
    pub fn new() -> Self {
        Ingest::default()
    }

    /// Parses `text` as one continuous-format bracket tree per non-empty
    /// line: every leaf token is a literal word, recorded into the
    /// returned sentence array at sequential positions. Returns one slot
    /// per input line; a malformed line becomes `Err` without affecting
    /// the others.
    pub fn read_bracket_trees(&mut self, text: &str) -> Vec<Result<ParsedTree>> {
        self.read_lines(text, false)
    }

    /// Parses `text` as one discontinuous-format bracket tree per
    /// non-empty line: every leaf token must be an explicit integer gap
    /// index rather than a literal word; a non-integer leaf token is a
    /// malformed tree. The returned sentence array is empty of literal
    /// words — callers supply the actual tokens out of band (e.g. a
    /// `discbracket` file's trailing tab-separated sentence column).
    pub fn read_discbracket_trees(&mut self, text: &str) -> Vec<Result<ParsedTree>> {
        self.read_lines(text, true)
    }

    fn read_lines(&mut self, text: &str, discontinuous: bool) -> Vec<Result<ParsedTree>> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| self.read_one(line, discontinuous))
            .collect()
    }

    /// Reads `path` from disk and parses it in the given mode, wrapping
    /// any I/O failure in [`FragmentError::Io`] rather than panicking or
    /// requiring the caller to handle a bare [`std::io::Error`].
    pub fn read_bracket_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        discontinuous: bool,
    ) -> Result<Vec<Result<ParsedTree>>> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.read_lines(&text, discontinuous))
    }

    fn read_one(&mut self, line: &str, discontinuous: bool) -> Result<ParsedTree> {
        let mut chars = line.char_indices().peekable();
        let mut nodes = Vec::new();
        let mut sentence = Vec::new();
        let mut next_pos = 0usize;
        let root = parse_node(
            line,
            &mut chars,
            &mut self.labels,
            &mut self.productions,
            &mut nodes,
            &mut next_pos,
            &mut sentence,
            discontinuous,
        )?;
        skip_ws(&mut chars);
        if chars.peek().is_some() {
            return Err(FragmentError::MalformedTree(format!(
                "trailing input after root: {line:?}"
            )));
        }
        Ok((nodes, root, sentence))
    }
}

type CharIter<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn skip_ws(chars: &mut CharIter) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn read_token<'a>(line: &'a str, chars: &mut CharIter) -> Result<&'a str> {
    let start = match chars.peek() {
        Some(&(i, _)) => i,
        None => return Err(FragmentError::MalformedTree("unexpected end of input".into())),
    };
    let mut end = start;
    while let Some(&(i, c)) = chars.peek() {
        if c.is_whitespace() || c == '(' || c == ')' {
            break;
        }
        end = i + c.len_utf8();
        chars.next();
    }
    if end == start {
        return Err(FragmentError::MalformedTree(format!(
            "expected a token at byte {start}"
        )));
    }
    Ok(&line[start..end])
}

/// Parses one `( label child )` / `( label leaf )` node starting at the
/// current cursor position (which must be at `(`), pushing raw
/// `arena::Node`s into `nodes` in the order their subtrees complete
/// (post-order-ish; exact order doesn't matter since `Ctrees::
/// push_from_nodes` canonicalizes on insertion). Returns the new node's
/// index.
#[allow(clippy::too_many_arguments)]
fn parse_node(
    line: &str,
    chars: &mut CharIter,
    labels: &mut LabelTable,
    productions: &mut ProductionTable,
    nodes: &mut Vec<Node>,
    next_pos: &mut usize,
    sentence: &mut Vec<Option<String>>,
    discontinuous: bool,
) -> Result<usize> {
    skip_ws(chars);
    match chars.next() {
        Some((_, '(')) => {}
        other => {
            return Err(FragmentError::MalformedTree(format!(
                "expected '(' at {other:?}"
            )))
        }
    }
    skip_ws(chars);
    let label_str = read_token(line, chars)?.to_string();
    skip_ws(chars);

    match chars.peek() {
        Some(&(_, '(')) => {
            let left = parse_node(
                line, chars, labels, productions, nodes, next_pos, sentence, discontinuous,
            )?;
            skip_ws(chars);
            let right = match chars.peek() {
                Some(&(_, ')')) => None,
                Some(&(_, '(')) => Some(parse_node(
                    line, chars, labels, productions, nodes, next_pos, sentence, discontinuous,
                )?),
                other => {
                    return Err(FragmentError::MalformedTree(format!(
                        "expected ')' or '(' at {other:?}"
                    )))
                }
            };
            skip_ws(chars);
            match chars.next() {
                Some((_, ')')) => {}
                other => {
                    return Err(FragmentError::MalformedTree(format!(
                        "expected ')' at {other:?}"
                    )))
                }
            }

            let label_id = labels.intern(&label_str);
            let mut key = vec![label_id, nodes[left].label];
            let right_i16 = match right {
                Some(r) => {
                    key.push(nodes[r].label);
                    r as i16
                }
                None => -1,
            };
            let prod = productions.intern(key);
            nodes.push(if right_i16 < 0 {
                Node::unary(prod, left as i16, label_id)
            } else {
                Node::binary(prod, left as i16, right_i16, label_id)
            });
            Ok(nodes.len() - 1)
        }
        Some(&(_, ')')) | None => Err(FragmentError::MalformedTree(format!(
            "node {label_str:?} has no child"
        ))),
        _ => {
            let tok = read_token(line, chars)?.to_string();
            skip_ws(chars);
            match chars.next() {
                Some((_, ')')) => {}
                other => {
                    return Err(FragmentError::MalformedTree(format!(
                        "expected ')' at {other:?}"
                    )))
                }
            }
            let label_id = labels.intern(&label_str);
            let pos = if discontinuous {
                tok.parse::<usize>().map_err(|_| {
                    FragmentError::MalformedTree(format!(
                        "expected an integer leaf index in discontinuous mode, found {tok:?}"
                    ))
                })?
            } else {
                let p = *next_pos;
                *next_pos += 1;
                p
            };
            if sentence.len() <= pos {
                sentence.resize(pos + 1, None);
            }
            if !discontinuous {
                sentence[pos] = Some(tok);
            }
            *next_pos = (*next_pos).max(pos + 1);
            nodes.push(Node::terminal(pos, label_id));
            Ok(nodes.len() - 1)
        }
    }
}

/// Writes a `fragment_key -> count` table as two-column TSV, optionally
/// gzip-compressed when `path` ends in `.gz`. Carried over from the
/// teacher's matrix writer (same `-`-rejection and gzip contract), but
/// repurposed for the flat key/count shape this crate's driver produces
/// instead of a square distance matrix.
pub fn write_fragment_counts<P: AsRef<Path>>(path: P, counts: &[(String, u64)]) -> Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use std::io::BufWriter;

    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Err(FragmentError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "writing to stdout is not supported by write_fragment_counts",
        )));
    }

    let is_gz = p.to_string_lossy().ends_with(".gz");
    let mut out: Box<dyn Write> = if is_gz {
        let f = File::create(p)?;
        Box::new(BufWriter::new(GzEncoder::new(f, Compression::default())))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    for (key, count) in counts {
        writeln!(&mut out, "{key}\t{count}")?;
    }
    out.flush()?;
    Ok(())
}
