//! Converting a fragment bitset back into a bracketed string, and the
//! gap-collapsing renumbering pass for discontinuous fragments.
//!
//! # Overview
//! A fragment is rendered top-down starting at its root. At every node
//! still inside the fragment the label is expanded with its children;
//! an unset (frontier) non-terminal stops the recursion and prints only
//! its own label plus, in discontinuous mode, the yield span it would
//! have dominated in the original tree. Terminal children never carry a
//! label of their own — it belongs to their preterminal parent — so
//! they always render bare: a plain index (continuous: the surface
//! token) when inside the fragment, or a trivial `k:k` self-span when
//! they are themselves the frontier.
//!
//! `get_sent` is a second, independent pass: it never touches the arena,
//! only the rendered string and the accompanying sentence array. This
//! mirrors how an external caller (e.g. the Python bindings) might hold
//! on to a rendered fragment string without also keeping the bitset
//! around.

use crate::arena::Node;
use crate::fragment::Fragment;
use regex::Regex;
use std::sync::OnceLock;

fn render_child_continuous(
    fragment: &Fragment,
    nodes: &[Node],
    labels: &[String],
    sentence: &[Option<String>],
    idx: usize,
) -> String {
    let node = nodes[idx];
    if let Some(t) = node.terminal_index() {
        return sentence.get(t).and_then(|w| w.clone()).unwrap_or_default();
    }
    if fragment.test(idx) {
        let mut s = format!("({} {}", labels[node.label as usize], render_child_continuous(fragment, nodes, labels, sentence, node.left as usize));
        if node.right >= 0 {
            s.push(' ');
            s.push_str(&render_child_continuous(fragment, nodes, labels, sentence, node.right as usize));
        }
        s.push(')');
        s
    } else {
        format!("({})", labels[node.label as usize])
    }
}

/// Renders a fragment as a bracketed string with literal surface tokens
/// at its terminals and bare `(LABEL)` leaves at its frontiers.
pub fn render_continuous(
    fragment: &Fragment,
    nodes: &[Node],
    labels: &[String],
    sentence: &[Option<String>],
) -> String {
    let root = fragment.root as usize;
    let node = nodes[root];
    if let Some(t) = node.terminal_index() {
        return sentence.get(t).and_then(|w| w.clone()).unwrap_or_default();
    }
    render_child_continuous(fragment, nodes, labels, sentence, root)
}

/// The minimal and maximal terminal index dominated by `idx` in the
/// *original* tree, ignoring the fragment entirely — used for a
/// frontier's gap-collapsed yield span.
fn yield_span(nodes: &[Node], idx: usize) -> (usize, usize) {
    let node = nodes[idx];
    if let Some(t) = node.terminal_index() {
        return (t, t);
    }
    let (mut lo, mut hi) = yield_span(nodes, node.left as usize);
    if node.right >= 0 {
        let (lo2, hi2) = yield_span(nodes, node.right as usize);
        lo = lo.min(lo2);
        hi = hi.max(hi2);
    }
    (lo, hi)
}

fn render_child_discontinuous(fragment: &Fragment, nodes: &[Node], labels: &[String], idx: usize) -> String {
    let node = nodes[idx];
    if let Some(t) = node.terminal_index() {
        return if fragment.test(idx) {
            t.to_string()
        } else {
            format!("{t}:{t}")
        };
    }
    if fragment.test(idx) {
        let mut s = format!("({} {}", labels[node.label as usize], render_child_discontinuous(fragment, nodes, labels, node.left as usize));
        if node.right >= 0 {
            s.push(' ');
            s.push_str(&render_child_discontinuous(fragment, nodes, labels, node.right as usize));
        }
        s.push(')');
        s
    } else {
        let (k, kp) = yield_span(nodes, idx);
        format!("({} {}:{})", labels[node.label as usize], k, kp)
    }
}

/// Renders a fragment as a bracketed string with terminal *indices* in
/// place of tokens, and `k:k'` yield spans at frontiers. Callers
/// typically feed the result straight into [`get_sent`] to collapse
/// gaps into a dense, renumbered sentence.
pub fn render_discontinuous(fragment: &Fragment, nodes: &[Node], labels: &[String]) -> String {
    let root = fragment.root as usize;
    let node = nodes[root];
    if let Some(t) = node.terminal_index() {
        return if fragment.test(root) { t.to_string() } else { format!("{t}:{t}") };
    }
    render_child_discontinuous(fragment, nodes, labels, root)
}

fn span_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+):(\d+)").unwrap())
}

fn leaf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\( *[^ ()]+ +(\d+)\)").unwrap())
}

struct Anchor {
    start: usize,
    end: usize,
    value: usize,
    end_value: usize,
    is_bare: bool,
}

/// Collapses a discontinuous-rendered fragment string's terminal
/// indices into a dense `0..m` renumbering, inserting a single `None`
/// placeholder in the accompanying sentence for every gap of one or
/// more missing indices, and dropping the `k:k'` span notation in favor
/// of the new dense index once spans no longer need to describe a gap
/// width.
///
/// `sentence[k]` is the surface token at original index `k`; the
/// returned sentence has one slot per *new* dense index, `None` for
/// every slot whose anchor was a frontier span rather than a bare
/// terminal reference.
pub fn get_sent(bracket: &str, sentence: &[Option<String>]) -> (String, Vec<Option<String>>) {
    let mut anchors: Vec<Anchor> = Vec::new();

    for caps in span_regex().captures_iter(bracket) {
        let whole = caps.get(0).unwrap();
        let k: usize = caps[1].parse().unwrap();
        let kp: usize = caps[2].parse().unwrap();
        anchors.push(Anchor {
            start: whole.start(),
            end: whole.end(),
            value: k,
            end_value: kp,
            is_bare: false,
        });
    }
    for caps in leaf_regex().captures_iter(bracket) {
        let digits = caps.get(1).unwrap();
        let k: usize = caps[1].parse().unwrap();
        anchors.push(Anchor {
            start: digits.start(),
            end: digits.end(),
            value: k,
            end_value: k,
            is_bare: true,
        });
    }

    let mut by_value: Vec<usize> = (0..anchors.len()).collect();
    by_value.sort_by_key(|&idx| anchors[idx].value);

    let mut new_idx = vec![0usize; anchors.len()];
    let mut out_sentence: Vec<Option<String>> = Vec::new();
    let mut prev_end: Option<usize> = None;
    let mut dense = 0usize;

    for &idx in &by_value {
        let a = &anchors[idx];
        if let Some(pe) = prev_end {
            if a.value > pe + 1 {
                out_sentence.push(None);
                dense += 1;
            }
        }
        new_idx[idx] = dense;
        if a.is_bare {
            out_sentence.push(sentence.get(a.value).cloned().flatten());
        } else {
            out_sentence.push(None);
        }
        dense += 1;
        prev_end = Some(a.end_value);
    }

    let mut by_pos: Vec<usize> = (0..anchors.len()).collect();
    by_pos.sort_by_key(|&idx| anchors[idx].start);

    let mut result = String::with_capacity(bracket.len());
    let mut cursor = 0usize;
    for &idx in &by_pos {
        let a = &anchors[idx];
        result.push_str(&bracket[cursor..a.start]);
        result.push_str(&new_idx[idx].to_string());
        cursor = a.end;
    }
    result.push_str(&bracket[cursor..]);

    (result, out_sentence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(words: &[&str]) -> Vec<Option<String>> {
        words.iter().map(|w| Some(w.to_string())).collect()
    }

    #[test]
    fn get_sent_scenario_1_collapses_single_gap() {
        let (bracket, sent) = get_sent(
            "(S (NP 2) (VP 4))",
            &words(&["The", "tall", "man", "there", "walks"]),
        );
        assert_eq!(bracket, "(S (NP 0) (VP 2))");
        assert_eq!(sent, vec![Some("man".to_string()), None, Some("walks".to_string())]);
    }

    #[test]
    fn get_sent_scenario_2_collapses_wide_gap_into_one_none() {
        let (bracket, sent) = get_sent(
            "(VP (VB 0) (PRT 3))",
            &words(&["Wake", "your", "friend", "up"]),
        );
        assert_eq!(bracket, "(VP (VB 0) (PRT 2))");
        assert_eq!(sent, vec![Some("Wake".to_string()), None, Some("up".to_string())]);
    }

    #[test]
    fn get_sent_scenario_3_frontier_spans_become_bare_and_all_none() {
        let (bracket, sent) = get_sent(
            "(S (NP 2:2 4:4) (VP 1:1 3:3))",
            &words(&["Walks", "the", "quickly", "man"]),
        );
        assert_eq!(bracket, "(S (NP 1 3) (VP 0 2))");
        assert_eq!(sent, vec![None, None, None, None]);
    }

    #[test]
    fn get_sent_scenario_4_wide_frontier_span_collapses_to_one_slot() {
        let (bracket, sent) = get_sent(
            "(ROOT (S 0:2) ($. 3))",
            &words(&["Foo", "bar", "zed", "."]),
        );
        assert_eq!(bracket, "(ROOT (S 0) ($. 1))");
        assert_eq!(sent, vec![None, Some(".".to_string())]);
    }

    /// `(S (NP x) (VP y))`: terminals 0,1 under preterminals NP (2), VP
    /// (3), under root S (4). Canonical order: terminals sentinel-lowest,
    /// then prods ascending (NP=0, VP=1, S=2).
    fn shared_tree() -> (Vec<Node>, Vec<String>) {
        let nodes = vec![
            Node::terminal(0, 0),     // 0: leaf "x"
            Node::terminal(1, 0),     // 1: leaf "y"
            Node::unary(0, 0, 0),     // 2: NP -> x
            Node::unary(1, 1, 1),     // 3: VP -> y
            Node::binary(2, 2, 3, 2), // 4: S -> NP VP
        ];
        let labels = vec!["NP".to_string(), "VP".to_string(), "S".to_string()];
        (nodes, labels)
    }

    #[test]
    fn render_continuous_whole_tree() {
        let (nodes, labels) = shared_tree();
        let slots = crate::bitops::slots_for(4);
        let mut frag = Fragment::new(slots, 4, 0);
        frag.set(0);
        frag.set(1);
        frag.set(2);
        frag.set(3);
        frag.set(4);
        let sentence = words(&["x", "y"]);
        let out = render_continuous(&frag, &nodes, &labels, &sentence);
        assert_eq!(out, "(S (NP x) (VP y))");
    }

    #[test]
    fn render_continuous_with_frontier_child() {
        let (nodes, labels) = shared_tree();
        let slots = crate::bitops::slots_for(4);
        let mut frag = Fragment::new(slots, 4, 0);
        frag.set(0);
        frag.set(2);
        frag.set(4);
        // node 3 (VP) left unset: a frontier.
        let sentence = words(&["x", "y"]);
        let out = render_continuous(&frag, &nodes, &labels, &sentence);
        assert_eq!(out, "(S (NP x) (VP))");
    }

    #[test]
    fn render_discontinuous_with_frontier_yields_span() {
        let (nodes, labels) = shared_tree();
        let slots = crate::bitops::slots_for(4);
        let mut frag = Fragment::new(slots, 4, 0);
        frag.set(0);
        frag.set(2);
        frag.set(4);
        let out = render_discontinuous(&frag, &nodes, &labels);
        assert_eq!(out, "(S (NP 0) (VP 1:1))");
    }
}
