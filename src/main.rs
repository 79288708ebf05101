use clap::Parser;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tree_fragments::arena::Ctrees;
use tree_fragments::counts::ExactOccurrenceCounter;
use tree_fragments::driver::{self, ExtractConfig, FragmentKey, FragmentTable, PairMode, Shard};
use tree_fragments::io::{write_fragment_counts, Ingest};

/// Extract recurring tree fragments from one or two bracketed treebanks
/// and write a fragment-key -> count table (TSV, optionally gzipped).
#[derive(Parser, Debug)]
#[command(name = "tree-fragments", version, about = "Tree fragment extraction over bracketed treebanks")]
struct Args {
    /// Path to a bracket-tree treebank (T1)
    #[arg(short = '1', long = "trees1")]
    trees1: PathBuf,

    /// Path to a second bracket-tree treebank (T2); defaults to T1 itself
    #[arg(short = '2', long = "trees2")]
    trees2: Option<PathBuf>,

    /// Shard start offset over T1 (inclusive)
    #[arg(long = "offset", default_value_t = 0)]
    offset: usize,

    /// Shard end offset over T1 (exclusive); defaults to the whole treebank
    #[arg(long = "end")]
    end: Option<usize>,

    /// Emit an approximate histogram instead of exact occurrence counts
    #[arg(long = "approx", default_value_t = false)]
    approx: bool,

    /// Render fragments with terminal indices and collapse gaps (discontinuous trees)
    #[arg(long = "discontinuous", default_value_t = false)]
    discontinuous: bool,

    /// Also emit the complement of every pair's maximal fragments
    #[arg(long = "complement", default_value_t = false)]
    complement: bool,

    /// Restrict candidate pairs to the two-terminals content-word filter
    #[arg(long = "twoterms", default_value_t = false)]
    twoterms: bool,

    /// Restrict candidate pairs to (n, n + 1) only
    #[arg(long = "adjacent", default_value_t = false)]
    adjacent: bool,

    /// Comma-separated content-word labels used by --twoterms
    #[arg(long = "content-labels", default_value = "NN,NNS,NNP,JJ,RB,VB,VBZ,VBP,VBD")]
    content_labels: String,

    /// Output path for the fragment-count table (TSV, gzip if it ends in .gz)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Number of shards to split T1 into (defaults to available parallelism)
    #[arg(long = "shards")]
    shards: Option<usize>,

    /// Quiet mode: suppresses info-level progress logging
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let t0 = Instant::now();
    let mut ingest = Ingest::new();

    let trees1_results = match ingest.read_bracket_file(&args.trees1, args.discontinuous) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("failed to read {:?}: {e}", args.trees1);
            std::process::exit(2);
        }
    };

    let mut t1 = Ctrees::alloc(256, 1024);
    let mut sents1 = Vec::new();
    for result in trees1_results {
        match result {
            Ok((nodes, root, sentence)) => match t1.push_from_nodes(nodes, root) {
                Ok(_) => sents1.push(sentence),
                Err(e) => log::warn!("skipping malformed tree in {:?}: {e}", args.trees1),
            },
            Err(e) => log::warn!("skipping malformed tree in {:?}: {e}", args.trees1),
        }
    }
    if t1.is_empty() {
        eprintln!("no trees parsed from {:?}", args.trees1);
        std::process::exit(2);
    }

    let same_corpus = args.trees2.is_none();
    let mut t2 = Ctrees::alloc(256, 1024);
    if let Some(path2) = &args.trees2 {
        let trees2_results = match ingest.read_bracket_file(path2, args.discontinuous) {
            Ok(results) => results,
            Err(e) => {
                eprintln!("failed to read {path2:?}: {e}");
                std::process::exit(2);
            }
        };
        for result in trees2_results {
            match result {
                Ok((nodes, root, _sentence)) => {
                    if let Err(e) = t2.push_from_nodes(nodes, root) {
                        log::warn!("skipping malformed tree in {path2:?}: {e}");
                    }
                }
                Err(e) => log::warn!("skipping malformed tree in {path2:?}: {e}"),
            }
        }
        if t2.is_empty() {
            eprintln!("no trees parsed from {path2:?}");
            std::process::exit(2);
        }
    }

    let read_s = t0.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("reading treebanks: {read_s:.3}s"));

    let t_index = Instant::now();
    t1.build_prod_index(ingest.productions.len());
    if !same_corpus {
        t2.build_prod_index(ingest.productions.len());
    }
    let t2_ref: &Ctrees = if same_corpus { &t1 } else { &t2 };
    let index_s = t_index.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("building production index: {index_s:.3}s"));

    let content_labels: HashSet<u32> = args
        .content_labels
        .split(',')
        .map(|s| ingest.labels.intern(s.trim()))
        .collect();
    let mode = if args.adjacent {
        PairMode::Adjacent
    } else if args.twoterms {
        PairMode::TwoTerminals { content_labels }
    } else {
        PairMode::All
    };
    let cfg = ExtractConfig::new(args.approx, args.discontinuous, args.complement, args.twoterms, args.adjacent);

    let end = args.end.unwrap_or(t1.len()).min(t1.len());
    let offset = args.offset.min(end);
    let num_shards = args.shards.unwrap_or_else(rayon::current_num_threads).max(1);
    let shards = split_shards(offset, end, num_shards);

    let t_extract = Instant::now();
    let labels = ingest.labels.as_slice();
    let shard_results: Vec<_> = shards
        .into_par_iter()
        .map(|shard| {
            log::debug!("starting shard [{}, {})", shard.offset, shard.end);
            driver::run_shard(&t1, t2_ref, shard, &mode, &cfg, labels, &sents1, same_corpus)
        })
        .collect();

    let mut tables = Vec::with_capacity(shard_results.len());
    for result in shard_results {
        match result {
            Ok(table) => tables.push(table),
            Err(e) => {
                eprintln!("extraction failed: {e}");
                std::process::exit(3);
            }
        }
    }
    let merged = driver::merge_shards(tables);
    let extract_s = t_extract.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("extraction: {extract_s:.3}s"));

    let t_write = Instant::now();
    let counts = match merged {
        FragmentTable::Histogram(map) => map
            .into_iter()
            .map(|(key, count)| (key_to_string(key), count))
            .collect::<Vec<_>>(),
        FragmentTable::Representative(map) => map
            .into_iter()
            .filter_map(|(key, fragment)| {
                match ExactOccurrenceCounter::count_scalar(&fragment, &t1, t2_ref) {
                    Ok(n) => Some((key_to_string(key), n as u64)),
                    Err(e) => {
                        log::warn!("failed to count fragment occurrences: {e}");
                        None
                    }
                }
            })
            .collect::<Vec<_>>(),
    };

    if let Err(e) = write_fragment_counts(&args.output, &counts) {
        eprintln!("failed to write {:?}: {e}", args.output);
        std::process::exit(4);
    }
    let write_s = t_write.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("writing output: {write_s:.3}s"));
}

/// Splits `[start, end)` into up to `n` contiguous, roughly-even shards.
fn split_shards(start: usize, end: usize, n: usize) -> Vec<Shard> {
    let total = end.saturating_sub(start);
    if total == 0 {
        return Vec::new();
    }
    let n = n.min(total).max(1);
    let base = total / n;
    let remainder = total % n;

    let mut shards = Vec::with_capacity(n);
    let mut offset = start;
    for i in 0..n {
        let size = base + usize::from(i < remainder);
        let shard_end = offset + size;
        shards.push(Shard { offset, end: shard_end });
        offset = shard_end;
    }
    shards
}

fn key_to_string(key: FragmentKey) -> String {
    match key {
        FragmentKey::Continuous(s) => s,
        FragmentKey::Discontinuous(s, sentence) => {
            let words: Vec<String> = sentence
                .into_iter()
                .map(|w| w.unwrap_or_else(|| "_".to_string()))
                .collect();
            format!("{s} ||| {}", words.join(" "))
        }
    }
}

fn log_if(show: bool, msg: String) {
    if show {
        log::info!("{msg}");
    }
}
