use crate::blocks::Block;
use crate::graph::{Handle, PathGraph, PathId, SequenceGraph, Step};
use crate::poa::PoaEngine;
use crate::progress::ProgressReporter;
use crate::maf::MafBlock;
use crate::smooth::{
    smooth_blocks, sort_position_ranges, PathPositionRange, SmoothConfig, SmoothedBlocks,
};
use crate::verify::{verify_embedding, verify_paths};
use log::{debug, error, info};
use std::io;

/// Counters collected while lacing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaceStats {
    pub blocks: usize,
    pub empty_blocks: usize,
    pub fragments: usize,
    pub gap_nodes: usize,
    pub gap_bases: usize,
}

/// The assembled graph and the names of the consensus paths embedded in it.
pub struct LaceResult {
    pub graph: SequenceGraph,
    pub consensus_paths: Vec<String>,
    pub stats: LaceStats,
    /// Block alignments, empty unless MSA output was requested.
    pub maf_blocks: Vec<MafBlock>,
}

#[inline]
fn translate(handle: Handle, offset: usize) -> Handle {
    Handle::new(handle.id() + offset, handle.is_reverse())
}

/// Append `handle` to `path`, joining it to the previous step with an edge.
fn append_linked(
    graph: &mut SequenceGraph,
    path: PathId,
    prev: &mut Option<Handle>,
    handle: Handle,
) {
    if let Some(p) = *prev {
        graph.create_edge(p, handle);
    }
    graph.append_step(path, handle);
    *prev = Some(handle);
}

/// Merge smoothed block graphs into one graph that carries every base path.
///
/// Block nodes keep their relative order; node `i` of block `b` becomes
/// `i + translation[b]`, where the translation is the node count reached just
/// before block `b` was appended. Base path sequence not covered by any block
/// is spelled by one new node per uncovered stretch.
pub fn lace_blocks<G: PathGraph>(
    base: &G,
    smoothed: SmoothedBlocks,
    progress: &dyn ProgressReporter,
) -> io::Result<LaceResult> {
    let SmoothedBlocks {
        block_graphs,
        mut path_ranges,
        mut consensus_ranges,
        maf_blocks,
    } = smoothed;
    let mut graph = SequenceGraph::new();
    let mut stats = LaceStats {
        blocks: block_graphs.len(),
        ..Default::default()
    };

    // Pass A: nodes and edges
    progress.phase("Merging block graphs", block_graphs.len());
    let mut translation: Vec<usize> = Vec::with_capacity(block_graphs.len());
    for (block_id, block_graph) in block_graphs.iter().enumerate() {
        let offset = graph.node_count();
        translation.push(offset);
        if block_graph.is_empty() {
            stats.empty_blocks += 1;
        } else {
            for id in 0..block_graph.node_count() {
                graph.create_node(block_graph.node_sequence(id).to_vec());
            }
            for &(from, to) in block_graph.edges() {
                graph.create_edge(translate(from, offset), translate(to, offset));
            }
        }
        progress.advance(block_id + 1, block_graphs.len());
    }
    debug!(
        "Merged {} block graphs into {} nodes and {} edges",
        block_graphs.len(),
        graph.node_count(),
        graph.edge_count()
    );

    // Pass B: base paths
    sort_position_ranges(&mut path_ranges);
    progress.phase("Lacing paths", base.path_count());
    let mut cursor = 0;
    for p in 0..base.path_count() {
        let base_path = PathId(p);
        let path = graph.create_path(base.path_name(base_path))?;
        let mut prev: Option<Handle> = None;
        let mut last_end_pos = 0;
        let mut last_step = base.path_begin(base_path);

        while cursor < path_ranges.len() && path_ranges[cursor].base_path == Some(base_path) {
            let record = &path_ranges[cursor];
            let (start_step, end_step) = record_steps(record)?;

            if record.start_pos < last_end_pos {
                error!(
                    "Path '{}': block {} starts at {} before the previous range ends at {}",
                    base.path_name(base_path),
                    record.block_id,
                    record.start_pos,
                    last_end_pos
                );
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Overlapping ranges on path '{}': block {} starts at {} \
                         but the previous range ends at {}",
                        base.path_name(base_path),
                        record.block_id,
                        record.start_pos,
                        last_end_pos
                    ),
                ));
            }
            if record.start_pos > last_end_pos {
                fill_gap(base, &mut graph, path, &mut prev, last_step, start_step, &mut stats);
            }

            let block_graph = &block_graphs[record.block_id];
            let offset = translation[record.block_id];
            for &handle in block_graph.path_steps(record.target_path) {
                append_linked(&mut graph, path, &mut prev, translate(handle, offset));
            }
            stats.fragments += 1;

            last_end_pos = record.end_pos;
            last_step = end_step;
            cursor += 1;
        }

        if last_end_pos < base.path_length(base_path) {
            let end = base.path_end(base_path);
            fill_gap(base, &mut graph, path, &mut prev, last_step, end, &mut stats);
        }
        progress.advance(p + 1, base.path_count());
    }

    if cursor != path_ranges.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} path ranges refer to paths missing from the base graph",
                path_ranges.len() - cursor
            ),
        ));
    }

    // Consensus paths, no gap filling
    sort_position_ranges(&mut consensus_ranges);
    let mut consensus_paths = Vec::with_capacity(consensus_ranges.len());
    for record in &consensus_ranges {
        let block_graph = &block_graphs[record.block_id];
        let offset = translation[record.block_id];
        let name = block_graph.path_name(record.target_path).to_string();
        let path = graph.create_path(&name)?;
        let mut prev: Option<Handle> = None;
        for &handle in block_graph.path_steps(record.target_path) {
            append_linked(&mut graph, path, &mut prev, translate(handle, offset));
        }
        consensus_paths.push(name);
    }

    info!(
        "Laced {} path fragments from {} blocks ({} empty) with {} gap nodes ({} bp); \
         {} consensus paths",
        stats.fragments,
        stats.blocks,
        stats.empty_blocks,
        stats.gap_nodes,
        stats.gap_bases,
        consensus_paths.len()
    );

    Ok(LaceResult {
        graph,
        consensus_paths,
        stats,
        maf_blocks,
    })
}

fn record_steps(record: &PathPositionRange) -> io::Result<(Step, Step)> {
    match (record.start_step, record.end_step) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Path range {}-{} of block {} has no steps",
                record.start_pos, record.end_pos, record.block_id
            ),
        )),
    }
}

/// Spell the base sequence of steps `[from, to)` with one new node.
fn fill_gap<G: PathGraph>(
    base: &G,
    graph: &mut SequenceGraph,
    path: PathId,
    prev: &mut Option<Handle>,
    from: Step,
    to: Step,
    stats: &mut LaceStats,
) {
    let sequence = base.step_range_sequence(from, to);
    if sequence.is_empty() {
        return;
    }
    stats.gap_nodes += 1;
    stats.gap_bases += sequence.len();
    let handle = graph.create_node(sequence);
    append_linked(graph, path, prev, handle);
}

/// Smooth every block, lace the results and check that the assembled graph
/// still carries every base path exactly.
pub fn smooth_and_lace<G, E, F>(
    base: &G,
    blocks: &[Block],
    config: &SmoothConfig,
    make_engine: F,
    progress: &dyn ProgressReporter,
) -> io::Result<LaceResult>
where
    G: PathGraph + Sync,
    E: PoaEngine,
    F: Fn() -> E + Sync + Send,
{
    info!(
        "Smoothing {} blocks over {} paths with {} threads",
        blocks.len(),
        base.path_count(),
        config.num_threads
    );
    let smoothed = smooth_blocks(base, blocks, config, make_engine, progress)?;
    let result = lace_blocks(base, smoothed, progress)?;

    info!("Verifying assembled paths");
    verify_paths(base, &result.graph)?;
    verify_embedding(&result.graph)?;

    info!(
        "Assembled graph: {} nodes, {} edges, {} paths",
        result.graph.node_count(),
        result.graph.edge_count(),
        result.graph.path_count()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::PathRange;
    use crate::poa::testing::ChainEngine;
    use crate::progress::NoProgress;

    /// One path over single-node-per-chunk `chunks`.
    fn linear_base(name: &str, chunks: &[&[u8]]) -> SequenceGraph {
        let mut graph = SequenceGraph::new();
        let path = graph.create_path(name).unwrap();
        let mut prev: Option<Handle> = None;
        for chunk in chunks {
            let h = graph.create_node(chunk.to_vec());
            if let Some(p) = prev {
                graph.create_edge(p, h);
            }
            graph.append_step(path, h);
            prev = Some(h);
        }
        graph
    }

    fn range(path: usize, begin: usize, end: usize) -> PathRange {
        PathRange {
            begin: Step { path: PathId(path), rank: begin },
            end: Step { path: PathId(path), rank: end },
        }
    }

    fn config(threads: usize, consensus: bool) -> SmoothConfig {
        SmoothConfig {
            num_threads: threads,
            consensus_prefix: consensus.then(|| "Consensus_".to_string()),
            ..Default::default()
        }
    }

    /// Single block graph of one node spelling `seq` with one path.
    fn single_node_block(seq: &[u8], path_name: &str) -> SequenceGraph {
        let mut graph = SequenceGraph::new();
        let h = graph.create_node(seq.to_vec());
        let path = graph.create_path(path_name).unwrap();
        graph.append_step(path, h);
        graph
    }

    #[test]
    fn test_lace_two_blocks_with_gap() {
        // 30 bp in 5 bp nodes: block 0 = [0,10), gap [10,15), block 1 = [15,30)
        let chunks: [&[u8]; 6] = [b"ACGTA", b"CCGTA", b"TTTTT", b"GGCAT", b"AACCA", b"TGCAT"];
        let base = linear_base("chr1", &chunks);
        let blocks = vec![
            Block::new(vec![range(0, 0, 2)]),
            Block::new(vec![range(0, 3, 6)]),
        ];
        let result = smooth_and_lace(
            &base,
            &blocks,
            &config(2, false),
            ChainEngine::flat,
            &NoProgress,
        )
        .unwrap();

        let path = result.graph.path_by_name("chr1").unwrap();
        assert_eq!(result.graph.path_sequence(path), base.path_sequence(PathId(0)));
        assert_eq!(result.stats.gap_nodes, 1);
        assert_eq!(result.stats.gap_bases, 5);
        // two compacted block nodes and one connector
        assert_eq!(result.graph.node_count(), 3);
        assert_eq!(result.graph.node_sequence(2), b"TTTTT");
        assert_eq!(
            result.graph.path_steps(path),
            &[Handle::forward(0), Handle::forward(2), Handle::forward(1)]
        );
        assert!(result.graph.has_edge(Handle::forward(0), Handle::forward(2)));
        assert!(result.graph.has_edge(Handle::forward(2), Handle::forward(1)));
    }

    #[test]
    fn test_lace_translation_skips_empty_blocks() {
        let base = linear_base("chr1", &[b"AAAA", b"CCCC"]);
        let smoothed = SmoothedBlocks {
            block_graphs: vec![
                single_node_block(b"AAAA", "chr1:0-4"),
                SequenceGraph::new(),
                single_node_block(b"CCCC", "chr1:4-8"),
            ],
            path_ranges: vec![
                PathPositionRange {
                    base_path: Some(PathId(0)),
                    start_pos: 4,
                    end_pos: 8,
                    start_step: Some(Step { path: PathId(0), rank: 1 }),
                    end_step: Some(Step { path: PathId(0), rank: 2 }),
                    target_path: PathId(0),
                    block_id: 2,
                },
                PathPositionRange {
                    base_path: Some(PathId(0)),
                    start_pos: 0,
                    end_pos: 4,
                    start_step: Some(Step { path: PathId(0), rank: 0 }),
                    end_step: Some(Step { path: PathId(0), rank: 1 }),
                    target_path: PathId(0),
                    block_id: 0,
                },
            ],
            consensus_ranges: Vec::new(),
            maf_blocks: Vec::new(),
        };
        let result = lace_blocks(&base, smoothed, &NoProgress).unwrap();
        assert_eq!(result.stats.empty_blocks, 1);
        assert_eq!(result.stats.gap_nodes, 0);
        assert_eq!(result.graph.node_count(), 2);
        assert_eq!(
            result.graph.path_steps(PathId(0)),
            &[Handle::forward(0), Handle::forward(1)]
        );
        assert_eq!(result.graph.path_sequence(PathId(0)), b"AAAACCCC".to_vec());
    }

    #[test]
    fn test_lace_overlap_is_rejected() {
        let base = linear_base("chr1", &[b"AAAA", b"CCCC"]);
        let blocks = vec![
            Block::new(vec![range(0, 0, 2)]),
            Block::new(vec![range(0, 1, 2)]),
        ];
        let err = smooth_and_lace(
            &base,
            &blocks,
            &config(1, false),
            ChainEngine::flat,
            &NoProgress,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_lace_uncovered_path_becomes_one_node() {
        let mut base = linear_base("chr1", &[b"AAAA", b"CCCC"]);
        let other = base.create_path("chr2").unwrap();
        let h = base.create_node(b"GG".to_vec());
        base.append_step(other, h);
        let h = base.create_node(b"TT".to_vec());
        base.append_step(other, h);
        base.create_path("empty").unwrap();

        let blocks = vec![Block::new(vec![range(0, 0, 2)])];
        let result = smooth_and_lace(
            &base,
            &blocks,
            &config(1, false),
            ChainEngine::flat,
            &NoProgress,
        )
        .unwrap();
        let chr2 = result.graph.path_by_name("chr2").unwrap();
        assert_eq!(result.graph.path_steps(chr2).len(), 1);
        assert_eq!(result.graph.path_sequence(chr2), b"GGTT".to_vec());
        let empty = result.graph.path_by_name("empty").unwrap();
        assert!(result.graph.path_steps(empty).is_empty());
    }

    #[test]
    fn test_lace_consensus_within_block_range() {
        let mut base = linear_base("a", &[b"ACGT", b"TTTT", b"GGCC"]);
        let b = base.create_path("b").unwrap();
        for seq in [b"ACGA", b"GGCA"] {
            let h = base.create_node(seq.to_vec());
            base.append_step(b, h);
        }
        let blocks = vec![
            Block::new(vec![range(0, 0, 1), range(1, 0, 1)]),
            Block::new(vec![range(0, 2, 3), range(1, 1, 2)]),
        ];
        let result = smooth_and_lace(
            &base,
            &blocks,
            &config(2, true),
            ChainEngine::flat,
            &NoProgress,
        )
        .unwrap();

        assert_eq!(result.consensus_paths, vec!["Consensus_0", "Consensus_1"]);
        let first = result.graph.path_by_name("Consensus_0").unwrap();
        let second = result.graph.path_by_name("Consensus_1").unwrap();
        // block 0 holds two 4 bp chains: nodes 0 and 1
        assert!(result.graph.path_steps(first).iter().all(|h| h.id() < 2));
        assert!(result
            .graph
            .path_steps(second)
            .iter()
            .all(|h| (2..4).contains(&h.id())));
        assert_eq!(result.graph.path_sequence(first), b"ACGT".to_vec());
        assert_eq!(result.graph.path_sequence(second), b"GGCC".to_vec());
    }

    #[test]
    fn test_lace_is_deterministic() {
        let chunks: [&[u8]; 8] = [b"AC", b"GT", b"TA", b"CA", b"GG", b"TC", b"AT", b"CG"];
        let base = linear_base("chr1", &chunks);
        let blocks: Vec<Block> = (0..4)
            .map(|i| Block::new(vec![range(0, 2 * i, 2 * i + 1)]))
            .collect();
        let first = smooth_and_lace(
            &base,
            &blocks,
            &config(4, true),
            ChainEngine::flat,
            &NoProgress,
        )
        .unwrap();
        let second = smooth_and_lace(
            &base,
            &blocks,
            &config(4, true),
            ChainEngine::flat,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(first.graph, second.graph);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn test_lace_repeated_empty_ranges() {
        let base = linear_base("chr1", &[b"ACGT", b"ACGT", b"TT"]);
        let blocks = vec![Block::new(vec![range(0, 0, 1), range(0, 2, 2), range(0, 2, 2)])];
        let result = smooth_and_lace(
            &base,
            &blocks,
            &config(1, false),
            ChainEngine::flat,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(result.stats.fragments, 1);
        assert_eq!(result.graph.path_count(), 1);
        let path = result.graph.path_by_name("chr1").unwrap();
        assert_eq!(result.graph.path_sequence(path), b"ACGTACGTTT".to_vec());
    }
}
