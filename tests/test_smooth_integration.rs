//! End-to-end smoothing with the SPOA engine: library round trips and the
//! `blocklace smooth` command on files in a temporary directory.

use blocklace::blocks::parse_blocks;
use blocklace::gfa::{parse_gfa, to_gfa_string};
use blocklace::graph::{reverse_complement, Handle, PathGraph, PathId, SequenceGraph};
use blocklace::lace::smooth_and_lace;
use blocklace::poa::{AlignmentMode, SpoaEngine, DEFAULT_SCORING_PARAMS};
use blocklace::progress::NoProgress;
use blocklace::smooth::SmoothConfig;
use std::fs;
use std::io::BufReader;
use std::process::Command;
use tempfile::TempDir;

/// Deterministic pseudo-random DNA from a linear congruential generator.
fn make_dna(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 33) as usize % 4]
        })
        .collect()
}

/// Replace every `every`-th base with a different one.
fn with_snps(seq: &[u8], every: usize) -> Vec<u8> {
    seq.iter()
        .enumerate()
        .map(|(i, &b)| {
            if i % every == every / 2 {
                match b {
                    b'A' => b'C',
                    b'C' => b'G',
                    b'G' => b'T',
                    _ => b'A',
                }
            } else {
                b
            }
        })
        .collect()
}

/// Each path gets its own chain of `chunk`-sized nodes.
fn build_base_graph(paths: &[(&str, Vec<u8>)], chunk: usize) -> SequenceGraph {
    let mut graph = SequenceGraph::new();
    for (name, seq) in paths {
        let path = graph.create_path(name).unwrap();
        let mut prev: Option<Handle> = None;
        for piece in seq.chunks(chunk) {
            let h = graph.create_node(piece.to_vec());
            if let Some(p) = prev {
                graph.create_edge(p, h);
            }
            graph.append_step(path, h);
            prev = Some(h);
        }
    }
    graph
}

/// Blocks of `width` steps over every path, leaving one step uncovered
/// between consecutive blocks.
fn blocks_tsv(graph: &SequenceGraph, width: usize) -> String {
    let mut out = String::new();
    for p in 0..graph.path_count() {
        let path = PathId(p);
        let steps = graph.path_end(path).rank;
        let mut begin = 0;
        let mut block_id = 0;
        while begin < steps {
            let end = (begin + width).min(steps);
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                block_id,
                graph.path_name(path),
                begin,
                end
            ));
            begin = end + 1;
            block_id += 1;
        }
    }
    out
}

fn pangenome() -> SequenceGraph {
    let reference = make_dna(600, 7);
    let variant = with_snps(&reference, 40);
    let inverted = reverse_complement(&reference);
    build_base_graph(
        &[
            ("sample1#1#chr1", reference),
            ("sample2#1#chr1", variant),
            ("sample3#1#chr1", inverted),
        ],
        20,
    )
}

fn config(threads: usize, consensus: bool) -> SmoothConfig {
    SmoothConfig {
        num_threads: threads,
        scoring_params: DEFAULT_SCORING_PARAMS,
        consensus_prefix: consensus.then(|| "Consensus_".to_string()),
        alignment_mode: AlignmentMode::Local,
        write_msa: false,
    }
}

fn total_sequence(graph: &SequenceGraph) -> usize {
    (0..graph.node_count()).map(|i| graph.node_sequence(i).len()).sum()
}

#[test]
fn test_spoa_round_trip_preserves_paths() {
    let base = pangenome();
    let blocks = parse_blocks(blocks_tsv(&base, 5).as_bytes(), &base).unwrap();
    let result = smooth_and_lace(
        &base,
        &blocks,
        &config(4, false),
        || SpoaEngine::new(DEFAULT_SCORING_PARAMS, AlignmentMode::Local),
        &NoProgress,
    )
    .unwrap();

    for p in 0..base.path_count() {
        let name = base.path_name(PathId(p));
        let path = result.graph.path_by_name(name).unwrap();
        assert_eq!(
            result.graph.path_sequence(path),
            base.path_sequence(PathId(p)),
            "path {}",
            name
        );
    }
    assert!(result.stats.gap_nodes > 0);
    // aligned blocks share sequence across haplotypes
    assert!(total_sequence(&result.graph) < total_sequence(&base));
}

#[test]
fn test_spoa_consensus_paths() {
    let base = pangenome();
    let blocks = parse_blocks(blocks_tsv(&base, 5).as_bytes(), &base).unwrap();
    let result = smooth_and_lace(
        &base,
        &blocks,
        &config(2, true),
        || SpoaEngine::new(DEFAULT_SCORING_PARAMS, AlignmentMode::Local),
        &NoProgress,
    )
    .unwrap();

    let non_empty = blocks.iter().filter(|b| !b.path_ranges.is_empty()).count();
    assert_eq!(result.consensus_paths.len(), non_empty);
    for name in &result.consensus_paths {
        let path = result.graph.path_by_name(name).unwrap();
        assert!(!result.graph.path_steps(path).is_empty());
    }
    assert_eq!(
        result.graph.path_count(),
        base.path_count() + result.consensus_paths.len()
    );
}

#[test]
fn test_spoa_results_independent_of_thread_count() {
    let base = pangenome();
    let blocks = parse_blocks(blocks_tsv(&base, 4).as_bytes(), &base).unwrap();
    let run = |threads| {
        smooth_and_lace(
            &base,
            &blocks,
            &config(threads, true),
            || SpoaEngine::new(DEFAULT_SCORING_PARAMS, AlignmentMode::Local),
            &NoProgress,
        )
        .unwrap()
    };
    let single = run(1);
    let multi = run(4);
    assert_eq!(
        to_gfa_string(&single.graph).unwrap(),
        to_gfa_string(&multi.graph).unwrap()
    );
}

#[test]
fn test_smooth_command() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();

    let base = pangenome();
    let gfa_in = work_dir.join("input.gfa");
    let blocks_in = work_dir.join("blocks.tsv");
    let gfa_out = work_dir.join("smoothed.gfa");
    let names_out = work_dir.join("consensus.txt");
    fs::write(&gfa_in, to_gfa_string(&base)?)?;
    fs::write(&blocks_in, blocks_tsv(&base, 6))?;

    let output = Command::new(env!("CARGO_BIN_EXE_blocklace"))
        .args([
            "smooth",
            "-g",
            gfa_in.to_str().unwrap(),
            "-b",
            blocks_in.to_str().unwrap(),
            "-o",
            gfa_out.to_str().unwrap(),
            "-Q",
            "Consensus_",
            "-V",
            "-f",
            names_out.to_str().unwrap(),
            "-t",
            "2",
        ])
        .output()?;
    assert!(
        output.status.success(),
        "smooth failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let smoothed = parse_gfa(BufReader::new(fs::File::open(&gfa_out)?))?;
    assert_eq!(smoothed.path_count(), base.path_count());
    for p in 0..base.path_count() {
        let name = base.path_name(PathId(p));
        let path = smoothed.path_by_name(name).unwrap();
        assert_eq!(smoothed.path_sequence(path), base.path_sequence(PathId(p)));
    }

    let names = fs::read_to_string(&names_out)?;
    assert!(names.lines().count() > 0);
    assert!(names.lines().all(|l| l.starts_with("Consensus_")));
    Ok(())
}

#[test]
fn test_spoa_global_mode_with_msa() {
    let base = pangenome();
    let blocks = parse_blocks(blocks_tsv(&base, 5).as_bytes(), &base).unwrap();
    let config = SmoothConfig {
        alignment_mode: AlignmentMode::Global,
        write_msa: true,
        ..config(2, false)
    };
    let result = smooth_and_lace(
        &base,
        &blocks,
        &config,
        || SpoaEngine::new(DEFAULT_SCORING_PARAMS, AlignmentMode::Global),
        &NoProgress,
    )
    .unwrap();

    for p in 0..base.path_count() {
        let name = base.path_name(PathId(p));
        let path = result.graph.path_by_name(name).unwrap();
        assert_eq!(result.graph.path_sequence(path), base.path_sequence(PathId(p)));
    }

    let non_empty = blocks.iter().filter(|b| !b.path_ranges.is_empty()).count();
    assert_eq!(result.maf_blocks.len(), non_empty);
    for maf in &result.maf_blocks {
        assert_eq!(maf.rows.len(), base.path_count());
        let width = maf.rows[0].text.len();
        assert!(maf.rows.iter().all(|r| r.text.len() == width));
        // the first sequence seeds the graph in its own orientation
        assert_eq!(maf.rows[0].strand, '+');
        assert!(maf.rows.iter().all(|r| r.start < r.src_size));
    }
}

#[test]
fn test_smooth_command_writes_maf() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();

    let base = pangenome();
    let gfa_in = work_dir.join("input.gfa");
    let blocks_in = work_dir.join("blocks.tsv");
    let gfa_out = work_dir.join("smoothed.gfa");
    let maf_out = work_dir.join("blocks.maf");
    fs::write(&gfa_in, to_gfa_string(&base)?)?;
    fs::write(&blocks_in, blocks_tsv(&base, 6))?;

    let output = Command::new(env!("CARGO_BIN_EXE_blocklace"))
        .args([
            "smooth",
            "-g",
            gfa_in.to_str().unwrap(),
            "-b",
            blocks_in.to_str().unwrap(),
            "-o",
            gfa_out.to_str().unwrap(),
            "-m",
            maf_out.to_str().unwrap(),
            "-Z",
        ])
        .output()?;
    assert!(
        output.status.success(),
        "smooth failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let maf = fs::read_to_string(&maf_out)?;
    assert!(maf.starts_with("##maf version=1\n"));
    assert!(maf.contains("alignment_mode=global"));
    let blocks = maf.lines().filter(|l| l.starts_with("a ")).count();
    let rows = maf.lines().filter(|l| l.starts_with("s ")).count();
    assert!(blocks > 0);
    assert_eq!(rows, 3 * blocks);

    let smoothed = parse_gfa(BufReader::new(fs::File::open(&gfa_out)?))?;
    for p in 0..base.path_count() {
        let name = base.path_name(PathId(p));
        let path = smoothed.path_by_name(name).unwrap();
        assert_eq!(smoothed.path_sequence(path), base.path_sequence(PathId(p)));
    }
    Ok(())
}

#[test]
fn test_smooth_command_rejects_unknown_path() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    let gfa_in = work_dir.join("input.gfa");
    let blocks_in = work_dir.join("blocks.tsv");
    fs::write(&gfa_in, to_gfa_string(&pangenome())?)?;
    fs::write(&blocks_in, "0\tmissing#1#chr1\t0\t2\n")?;

    let output = Command::new(env!("CARGO_BIN_EXE_blocklace"))
        .args([
            "smooth",
            "-g",
            gfa_in.to_str().unwrap(),
            "-b",
            blocks_in.to_str().unwrap(),
            "-o",
            work_dir.join("out.gfa").to_str().unwrap(),
        ])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    Ok(())
}
