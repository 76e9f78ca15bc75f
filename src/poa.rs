use crate::gfa::{parse_path_steps, parse_walk_steps};
use log::debug;
use rustc_hash::FxHashMap;
use spoa_rs::{AlignmentEngine, AlignmentType as SpoaAlignmentType, Graph as SpoaGraph};
use std::io;

/// POA scoring parameters: (match, mismatch, gap_open1, gap_ext1, gap_open2, gap_ext2).
pub type ScoringParams = (u8, u8, u8, u8, u8, u8);

pub const DEFAULT_SCORING_PARAMS: ScoringParams = (1, 4, 6, 2, 26, 1);

/// Parse "match,mismatch,gap1,ext1[,gap2,ext2]". Four values give affine gaps
/// (the second gap pair repeats the first); six give convex gaps.
pub fn parse_scoring_params(params: &str) -> io::Result<ScoringParams> {
    let values: Vec<u8> = params
        .split(',')
        .map(|v| {
            v.trim().parse::<u8>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid POA score '{}' in '{}'", v, params),
                )
            })
        })
        .collect::<io::Result<_>>()?;
    match values[..] {
        [m, n, g, e] => Ok((m, n, g, e, g, e)),
        [m, n, g, e, q, c] => Ok((m, n, g, e, q, c)),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "POA parameters must be 4 or 6 comma-separated values, got '{}'",
                params
            ),
        )),
    }
}

/// Which part of each sequence must align to the graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlignmentMode {
    /// Smith-Waterman: sequence and graph may both be clipped.
    #[default]
    Local,
    /// Needleman-Wunsch over the whole sequence and graph.
    Global,
}

impl AlignmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AlignmentMode::Local => "local",
            AlignmentMode::Global => "global",
        }
    }
}

/// Read-only view of an alignment graph: one symbol per node, out-edges, and
/// for every committed sequence the chain of nodes it spells.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoaGraph {
    symbols: Vec<u8>,
    out_edges: Vec<Vec<usize>>,
    sequences: Vec<Vec<usize>>,
    successors: Vec<FxHashMap<usize, usize>>,
}

impl PoaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, symbol: u8) -> usize {
        self.symbols.push(symbol);
        self.out_edges.push(Vec::new());
        self.symbols.len() - 1
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.out_edges[from].contains(&to) {
            self.out_edges[from].push(to);
        }
    }

    /// Register the node chain of the next committed sequence.
    pub fn add_sequence(&mut self, nodes: Vec<usize>) {
        let successors = nodes.windows(2).map(|w| (w[0], w[1])).collect();
        self.sequences.push(nodes);
        self.successors.push(successors);
    }

    pub fn node_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol(&self, node: usize) -> u8 {
        self.symbols[node]
    }

    pub fn out_edges(&self, node: usize) -> &[usize] {
        &self.out_edges[node]
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn sequence_begin(&self, sequence: usize) -> Option<usize> {
        self.sequences[sequence].first().copied()
    }

    /// Next node of `sequence` after `node`, if the sequence continues.
    pub fn successor(&self, node: usize, sequence: usize) -> Option<usize> {
        self.successors[sequence].get(&node).copied()
    }

    /// Walk a sequence's successor chain from its begin node.
    pub fn sequence_nodes(&self, sequence: usize) -> Vec<usize> {
        let mut nodes = Vec::new();
        let mut cur = self.sequence_begin(sequence);
        while let Some(node) = cur {
            nodes.push(node);
            cur = self.successor(node, sequence);
        }
        nodes
    }
}

/// Progressive multiple sequence alignment onto a growing DAG.
pub trait PoaEngine {
    type Alignment;

    /// Drop the current graph; `expected_size` is a sizing hint.
    fn reset(&mut self, expected_size: usize);

    /// Align against the current graph without modifying it.
    fn align(&mut self, sequence: &[u8]) -> io::Result<(Self::Alignment, i64)>;

    /// Add an aligned sequence to the graph.
    fn commit(&mut self, alignment: Self::Alignment, sequence: &[u8]) -> io::Result<()>;

    /// Align `forward` and its reverse complement `reverse`, then commit the
    /// better-scoring alignment, `forward` on ties. Returns whether `reverse`
    /// was committed.
    fn commit_best(&mut self, forward: &[u8], reverse: &[u8]) -> io::Result<bool> {
        let (alignment_fwd, score_fwd) = self.align(forward)?;
        let (alignment_rev, score_rev) = self.align(reverse)?;
        if score_fwd >= score_rev {
            self.commit(alignment_fwd, forward)?;
            Ok(false)
        } else {
            self.commit(alignment_rev, reverse)?;
            Ok(true)
        }
    }

    /// Heaviest-path consensus as node ids of [`PoaEngine::graph`].
    fn consensus(&mut self) -> io::Result<Vec<usize>>;

    fn graph(&self) -> io::Result<PoaGraph>;

    /// One gapped row per committed sequence, in commit order. Rows share the
    /// same width and use `-` for gaps.
    fn msa(&mut self) -> io::Result<Vec<Vec<u8>>>;
}

/// SPOA-backed engine with convex gap penalties.
pub struct SpoaEngine {
    engine: AlignmentEngine,
    graph: SpoaGraph,
    committed: usize,
}

const SPOA_CONSENSUS_NAME: &str = "Consensus";

impl SpoaEngine {
    pub fn new(scoring_params: ScoringParams, mode: AlignmentMode) -> Self {
        let (match_score, mismatch, gap_open1, gap_extend1, gap_open2, gap_extend2) =
            scoring_params;
        let alignment_type = match mode {
            AlignmentMode::Local => SpoaAlignmentType::kSW,
            AlignmentMode::Global => SpoaAlignmentType::kNW,
        };
        let engine = AlignmentEngine::new_convex(
            alignment_type,
            match_score as i8,
            -(mismatch as i8),
            -(gap_open1 as i8),
            -(gap_extend1 as i8),
            -(gap_open2 as i8),
            -(gap_extend2 as i8),
        );
        SpoaEngine {
            engine,
            graph: SpoaGraph::new(),
            committed: 0,
        }
    }

    fn headers(&self) -> Vec<String> {
        (0..self.committed).map(|i| format!("seq{}", i)).collect()
    }

    /// Snapshot the SPOA graph through its GFA rendering.
    fn snapshot(&self, include_consensus: bool) -> io::Result<(PoaGraph, Vec<usize>)> {
        let headers = self.headers();
        let gfa = self.graph.generate_gfa(&headers, include_consensus);
        poa_graph_from_gfa(&gfa, &headers)
    }
}

fn validate_sequence(sequence: &[u8]) -> io::Result<&str> {
    if sequence.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Cannot align an empty sequence",
        ));
    }
    if let Some(bad) = sequence.iter().find(|b| !b.is_ascii_alphabetic()) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Sequence contains invalid symbol 0x{:02x}", bad),
        ));
    }
    std::str::from_utf8(sequence)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
}

impl PoaEngine for SpoaEngine {
    // SPOA alignments stay inside `commit_best`; a standalone `commit`
    // realigns against the graph it is about to extend.
    type Alignment = ();

    fn reset(&mut self, expected_size: usize) {
        debug!("Resetting SPOA graph (expected sequence size {})", expected_size);
        self.graph = SpoaGraph::new();
        self.committed = 0;
    }

    fn align(&mut self, sequence: &[u8]) -> io::Result<((), i64)> {
        let sequence = validate_sequence(sequence)?;
        let (score, _) = self.engine.align(sequence, &self.graph);
        Ok(((), score as i64))
    }

    fn commit(&mut self, _alignment: (), sequence: &[u8]) -> io::Result<()> {
        let sequence = validate_sequence(sequence)?;
        let weights = vec![1u32; sequence.len()];
        let (_, alignment) = self.engine.align(sequence, &self.graph);
        self.graph
            .add_alignment_with_weights(alignment, sequence, &weights);
        self.committed += 1;
        Ok(())
    }

    fn commit_best(&mut self, forward: &[u8], reverse: &[u8]) -> io::Result<bool> {
        let forward = validate_sequence(forward)?;
        let reverse = validate_sequence(reverse)?;
        let (score_fwd, alignment_fwd) = self.engine.align(forward, &self.graph);
        let (score_rev, alignment_rev) = self.engine.align(reverse, &self.graph);
        let is_reverse = score_fwd < score_rev;
        let weights = vec![1u32; forward.len()];
        if is_reverse {
            self.graph
                .add_alignment_with_weights(alignment_rev, reverse, &weights);
        } else {
            self.graph
                .add_alignment_with_weights(alignment_fwd, forward, &weights);
        }
        self.committed += 1;
        Ok(is_reverse)
    }

    fn consensus(&mut self) -> io::Result<Vec<usize>> {
        let (_, consensus) = self.snapshot(true)?;
        Ok(consensus)
    }

    fn graph(&self) -> io::Result<PoaGraph> {
        let (graph, _) = self.snapshot(false)?;
        Ok(graph)
    }

    fn msa(&mut self) -> io::Result<Vec<Vec<u8>>> {
        let rows: Vec<Vec<u8>> = self
            .graph
            .generate_msa()
            .into_iter()
            .map(String::into_bytes)
            .collect();
        if rows.len() != self.committed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "SPOA MSA has {} rows for {} sequences",
                    rows.len(),
                    self.committed
                ),
            ));
        }
        Ok(rows)
    }
}

/// Convert a single-symbol-per-segment GFA (as rendered by SPOA) into a
/// [`PoaGraph`]. Paths named in `headers` become the committed sequences, in
/// header order; any other path is taken as the consensus.
fn poa_graph_from_gfa(gfa: &str, headers: &[String]) -> io::Result<(PoaGraph, Vec<usize>)> {
    let mut graph = PoaGraph::new();
    let mut node_ids: FxHashMap<&str, usize> = FxHashMap::default();
    let mut links: Vec<(&str, &str)> = Vec::new();
    let mut paths: FxHashMap<String, Vec<(String, bool)>> = FxHashMap::default();

    for (line_no, line) in gfa.lines().enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        match fields[0] {
            "S" if fields.len() >= 3 => {
                let symbol = fields[2].as_bytes().first().copied().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Empty POA segment '{}'", fields[1]),
                    )
                })?;
                node_ids.insert(fields[1], graph.add_node(symbol));
            }
            "L" if fields.len() >= 5 => links.push((fields[1], fields[3])),
            "P" if fields.len() >= 3 => {
                paths.insert(fields[1].to_string(), parse_path_steps(fields[2], line_no)?);
            }
            "W" if fields.len() >= 7 => {
                paths.insert(fields[3].to_string(), parse_walk_steps(fields[6], line_no)?);
            }
            _ => {}
        }
    }

    let lookup = |name: &str| -> io::Result<usize> {
        node_ids.get(name).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("POA graph references unknown node '{}'", name),
            )
        })
    };

    for (from, to) in links {
        graph.add_edge(lookup(from)?, lookup(to)?);
    }

    for header in headers {
        let steps = paths.remove(header).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("POA graph lacks the path of sequence '{}'", header),
            )
        })?;
        let nodes = steps
            .iter()
            .map(|(segment, _)| lookup(segment))
            .collect::<io::Result<Vec<_>>>()?;
        graph.add_sequence(nodes);
    }

    let consensus = match paths
        .remove(SPOA_CONSENSUS_NAME)
        .or_else(|| paths.into_values().next())
    {
        Some(steps) => steps
            .iter()
            .map(|(segment, _)| lookup(segment))
            .collect::<io::Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok((graph, consensus))
}
