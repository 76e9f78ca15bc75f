use crate::blocks::Block;
use crate::graph::{reverse_complement, Handle, PathGraph, PathId, SequenceGraph, Step};
use crate::maf::{MafBlock, MafRow};
use crate::normalize::{apply_ordering, topological_order, unchop};
use crate::poa::{AlignmentMode, PoaEngine, PoaGraph, ScoringParams, DEFAULT_SCORING_PARAMS};
use crate::progress::ProgressReporter;
use log::{debug, error, info};
use rayon::prelude::*;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Configuration for smoothing and lacing.
pub struct SmoothConfig {
    /// Worker threads for per-block alignment.
    /// Default: number of logical CPUs
    pub num_threads: usize,

    /// POA scoring parameters: (match, mismatch, gap_open1, gap_ext1, gap_open2, gap_ext2)
    /// Default: (1, 4, 6, 2, 26, 1)
    pub scoring_params: ScoringParams,

    /// Prefix of consensus path names; `None` disables consensus paths.
    /// Block `i` gets the consensus path `<prefix><i>`.
    pub consensus_prefix: Option<String>,

    /// Local (Smith-Waterman) or global (Needleman-Wunsch) alignment.
    /// Default: local
    pub alignment_mode: AlignmentMode,

    /// Keep the multiple sequence alignment of every block for MAF output.
    pub write_msa: bool,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        SmoothConfig {
            num_threads: num_cpus::get(),
            scoring_params: DEFAULT_SCORING_PARAMS,
            consensus_prefix: None,
            alignment_mode: AlignmentMode::default(),
            write_msa: false,
        }
    }
}

impl SmoothConfig {
    /// Consensus path name for a block, empty when consensus is disabled.
    pub fn consensus_name(&self, block_id: usize) -> String {
        match &self.consensus_prefix {
            Some(prefix) => format!("{}{}", prefix, block_id),
            None => String::new(),
        }
    }
}

/// Ties a base path range to the path that realizes it inside a block graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathPositionRange {
    /// Base path the range comes from; `None` marks a consensus record.
    pub base_path: Option<PathId>,
    /// Start offset on the base path.
    pub start_pos: usize,
    /// End offset (exclusive) on the base path.
    pub end_pos: usize,
    pub start_step: Option<Step>,
    pub end_step: Option<Step>,
    /// Path inside the block graph of `block_id`.
    pub target_path: PathId,
    pub block_id: usize,
}

impl PathPositionRange {
    pub fn is_consensus(&self) -> bool {
        self.base_path.is_none()
    }
}

/// Output of the parallel smoothing phase.
pub struct SmoothedBlocks {
    /// One graph per block, in block order. Degenerate blocks have empty graphs.
    pub block_graphs: Vec<SequenceGraph>,
    /// One record per block range that carries sequence, unsorted.
    pub path_ranges: Vec<PathPositionRange>,
    /// One record per non-empty block when consensus is enabled, unsorted.
    pub consensus_ranges: Vec<PathPositionRange>,
    /// Per-block alignments in block order, when `write_msa` is set.
    pub maf_blocks: Vec<MafBlock>,
}

/// Sort by base path, then start offset. Block id breaks ties so consensus
/// records (all at offset 0 of no path) come out in block order.
pub fn sort_position_ranges(ranges: &mut [PathPositionRange]) {
    ranges.par_sort_by_key(|r| (r.base_path, r.start_pos, r.block_id));
}

// ---------------------------------------------------------------------------
// Block smoothing
// ---------------------------------------------------------------------------

/// Sequence spelled by each range of the block, in range order.
pub fn extract_block_sequences<G: PathGraph>(graph: &G, block: &Block) -> Vec<Vec<u8>> {
    block
        .path_ranges
        .iter()
        .map(|range| graph.step_range_sequence(range.begin, range.end))
        .collect()
}

/// Align one block and turn the alignment into a compact standalone graph.
///
/// The result has one path per range that carries sequence (in the order of
/// `block.path_ranges`) and, when `consensus_name` is not empty, a final
/// consensus path. A block without any sequence yields an empty graph.
pub fn smooth_block<G: PathGraph, E: PoaEngine>(
    graph: &G,
    block: &Block,
    block_id: usize,
    engine: &mut E,
    consensus_name: &str,
) -> io::Result<SequenceGraph> {
    let (block_graph, _) = align_block(graph, block, block_id, engine, consensus_name, false)?;
    Ok(block_graph)
}

/// [`smooth_block`], also returning the block's alignment as MAF rows when
/// `write_msa` is set and the block carries sequence.
fn align_block<G: PathGraph, E: PoaEngine>(
    graph: &G,
    block: &Block,
    block_id: usize,
    engine: &mut E,
    consensus_name: &str,
    write_msa: bool,
) -> io::Result<(SequenceGraph, Option<MafBlock>)> {
    let sequences = extract_block_sequences(graph, block);
    let max_sequence_size = sequences.iter().map(Vec::len).max().unwrap_or(0);
    if max_sequence_size == 0 {
        debug!("Block {} carries no sequence", block_id);
        return Ok((SequenceGraph::new(), None));
    }

    debug!(
        "Block {}: aligning {} sequences (longest {} bp)",
        block_id,
        sequences.len(),
        max_sequence_size
    );
    engine.reset(max_sequence_size);

    // (range index, committed as reverse complement) per engine sequence
    let mut committed: Vec<(usize, bool)> = Vec::with_capacity(sequences.len());
    for (i, seq) in sequences.iter().enumerate() {
        if seq.is_empty() {
            continue;
        }
        let is_reverse = engine
            .commit_best(seq, &reverse_complement(seq))
            .map_err(|e| {
                error!(
                    "Block {}: alignment engine rejected sequence {}: {}",
                    block_id, i, e
                );
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Block {} sequence {} was rejected by the alignment engine: {}",
                        block_id, i, e
                    ),
                )
            })?;
        committed.push((i, is_reverse));
    }

    let consensus = if consensus_name.is_empty() {
        None
    } else {
        Some(engine.consensus()?)
    };
    let poa = engine.graph()?;
    if poa.sequence_count() != committed.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Block {}: alignment graph holds {} sequences, expected {}",
                block_id,
                poa.sequence_count(),
                committed.len()
            ),
        ));
    }

    let maf = if write_msa {
        Some(maf_block(graph, block, block_id, &committed, engine.msa()?))
    } else {
        None
    };

    let block_graph = build_block_graph(
        graph,
        block,
        &poa,
        &committed,
        consensus.as_deref().map(|nodes| (consensus_name, nodes)),
    )?;
    let block_graph = unchop(&block_graph)?;
    let order = topological_order(&block_graph);
    Ok((apply_ordering(&block_graph, &order)?, maf))
}

/// MAF rows for the committed sequences. Rows committed as reverse
/// complements are reported on the '-' strand of their path.
fn maf_block<G: PathGraph>(
    graph: &G,
    block: &Block,
    block_id: usize,
    committed: &[(usize, bool)],
    msa: Vec<Vec<u8>>,
) -> MafBlock {
    let rows = committed
        .iter()
        .zip(msa)
        .map(|(&(range_idx, is_reverse), text)| {
            let range = &block.path_ranges[range_idx];
            let path = graph.path_of_step(range.begin);
            let src_size = graph.path_length(path);
            let start = graph.position_of_step(range.begin);
            let end = graph.position_of_step(range.end);
            MafRow {
                name: graph.path_name(path).to_string(),
                start: if is_reverse { src_size - end } else { start },
                strand: if is_reverse { '-' } else { '+' },
                src_size,
                text,
            }
        })
        .collect();
    MafBlock { block_id, rows }
}

/// One single-base node per alignment node, edges copied, one path per
/// committed sequence.
/// Sequences committed in reverse are walked backwards on reverse handles so
/// every path spells its range's original sequence.
fn build_block_graph<G: PathGraph>(
    graph: &G,
    block: &Block,
    poa: &PoaGraph,
    committed: &[(usize, bool)],
    consensus: Option<(&str, &[usize])>,
) -> io::Result<SequenceGraph> {
    let mut output = SequenceGraph::new();
    for node in 0..poa.node_count() {
        output.create_node(vec![poa.symbol(node)]);
    }
    for node in 0..poa.node_count() {
        for &to in poa.out_edges(node) {
            output.create_edge(Handle::forward(node), Handle::forward(to));
        }
    }

    // ranges without sequence were never committed and get no path
    let mut paths = Vec::with_capacity(committed.len());
    for &(range_idx, _) in committed {
        let range = &block.path_ranges[range_idx];
        let name = format!(
            "{}:{}-{}",
            graph.path_name(graph.path_of_step(range.begin)),
            graph.position_of_step(range.begin),
            graph.position_of_step(range.end)
        );
        paths.push(output.create_path(&name)?);
    }

    for (sequence, &(_, is_reverse)) in committed.iter().enumerate() {
        let nodes = poa.sequence_nodes(sequence);
        let path = paths[sequence];
        if is_reverse {
            for &node in nodes.iter().rev() {
                output.append_step(path, Handle::new(node, true));
            }
        } else {
            for &node in &nodes {
                output.append_step(path, Handle::forward(node));
            }
        }
    }

    if let Some((name, nodes)) = consensus {
        let path = output.create_path(name)?;
        for &node in nodes {
            output.append_step(path, Handle::forward(node));
        }
    }

    Ok(output)
}

// ---------------------------------------------------------------------------
// Parallel driver
// ---------------------------------------------------------------------------

/// Smooth every block on a pool of `config.num_threads` workers.
///
/// Each worker builds its own engine with `make_engine`. Block graphs come
/// back in block order whatever the completion order; position records are
/// gathered under locks and left unsorted.
pub fn smooth_blocks<G, E, F>(
    graph: &G,
    blocks: &[Block],
    config: &SmoothConfig,
    make_engine: F,
    progress: &dyn ProgressReporter,
) -> io::Result<SmoothedBlocks>
where
    G: PathGraph + Sync,
    E: PoaEngine,
    F: Fn() -> E + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build()
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to build smoothing thread pool: {}", e),
            )
        })?;

    let path_ranges: Mutex<Vec<PathPositionRange>> = Mutex::new(Vec::new());
    let consensus_ranges: Mutex<Vec<PathPositionRange>> = Mutex::new(Vec::new());
    let finished = AtomicUsize::new(0);
    let total = blocks.len();

    progress.phase("Smoothing blocks", total);
    let outputs = pool.install(|| {
        blocks
            .par_iter()
            .enumerate()
            .map_init(
                || make_engine(),
                |engine, (block_id, block)| -> io::Result<(SequenceGraph, Option<MafBlock>)> {
                    let consensus_name = config.consensus_name(block_id);
                    let (block_graph, maf) = align_block(
                        graph,
                        block,
                        block_id,
                        engine,
                        &consensus_name,
                        config.write_msa,
                    )?;

                    if !block_graph.is_empty() {
                        let records = block_path_ranges(graph, block, block_id);
                        path_ranges
                            .lock()
                            .map_err(|_| poisoned("path range"))?
                            .extend(records);

                        if !consensus_name.is_empty() {
                            let record =
                                consensus_path_range(&block_graph, block_id, &consensus_name)?;
                            consensus_ranges
                                .lock()
                                .map_err(|_| poisoned("consensus range"))?
                                .push(record);
                        }
                    }

                    let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.advance(done, total);
                    Ok((block_graph, maf))
                },
            )
            .collect::<io::Result<Vec<_>>>()
    })?;
    let (block_graphs, maf_blocks): (Vec<SequenceGraph>, Vec<Option<MafBlock>>) =
        outputs.into_iter().unzip();
    let maf_blocks: Vec<MafBlock> = maf_blocks.into_iter().flatten().collect();

    let path_ranges = path_ranges.into_inner().map_err(|_| poisoned("path range"))?;
    let consensus_ranges = consensus_ranges
        .into_inner()
        .map_err(|_| poisoned("consensus range"))?;

    info!(
        "Smoothed {} blocks ({} empty) into {} path fragments and {} consensus paths",
        block_graphs.len(),
        block_graphs.iter().filter(|g| g.is_empty()).count(),
        path_ranges.len(),
        consensus_ranges.len()
    );

    Ok(SmoothedBlocks {
        block_graphs,
        path_ranges,
        consensus_ranges,
        maf_blocks,
    })
}

/// Records for the ranges of a smoothed block that carry sequence. Path `i` of
/// the block graph realizes the `i`-th such range.
fn block_path_ranges<G: PathGraph>(
    graph: &G,
    block: &Block,
    block_id: usize,
) -> Vec<PathPositionRange> {
    block
        .path_ranges
        .iter()
        .filter_map(|range| {
            let start_pos = graph.position_of_step(range.begin);
            let end_pos = graph.position_of_step(range.end);
            (end_pos > start_pos).then_some((range, start_pos, end_pos))
        })
        .enumerate()
        .map(|(i, (range, start_pos, end_pos))| PathPositionRange {
            base_path: Some(graph.path_of_step(range.begin)),
            start_pos,
            end_pos,
            start_step: Some(range.begin),
            end_step: Some(range.end),
            target_path: PathId(i),
            block_id,
        })
        .collect()
}

fn consensus_path_range(
    block_graph: &SequenceGraph,
    block_id: usize,
    consensus_name: &str,
) -> io::Result<PathPositionRange> {
    let target_path = block_graph.path_by_name(consensus_name).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Block {} graph has no consensus path '{}'",
                block_id, consensus_name
            ),
        )
    })?;
    Ok(PathPositionRange {
        base_path: None,
        start_pos: 0,
        end_pos: block_graph.path_length(target_path),
        start_step: None,
        end_step: None,
        target_path,
        block_id,
    })
}

fn poisoned(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("A smoothing worker panicked while holding the {} lock", what),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
