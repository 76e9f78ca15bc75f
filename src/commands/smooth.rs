use crate::blocks::parse_blocks;
use crate::gfa::{parse_gfa, write_gfa};
use crate::graph::{PathGraph, SequenceGraph};
use crate::lace::smooth_and_lace;
use crate::maf::{write_maf_block, write_maf_header, MafBlock};
use crate::normalize::unchop;
use crate::poa::{parse_scoring_params, AlignmentMode, SpoaEngine};
use crate::progress::LogProgress;
use crate::smooth::SmoothConfig;
use log::{debug, info, warn};
use noodles::bgzf;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::Path;

/// Realign the blocks of a graph and write the laced result as GFA.
#[allow(clippy::too_many_arguments)]
pub fn run_smooth(
    gfa_in: &str,
    blocks_file: &str,
    output: &str,
    poa_params: &str,
    consensus_prefix: Option<String>,
    vanish_consensus: bool,
    consensus_names_out: Option<&str>,
    maf_out: Option<&str>,
    alignment_mode: AlignmentMode,
    poa_threads: NonZeroUsize,
    io_threads: NonZeroUsize,
) -> io::Result<()> {
    info!("Running smooth command");

    let scoring_params = parse_scoring_params(poa_params)?;
    if vanish_consensus && consensus_prefix.is_none() {
        warn!("--vanish-consensus has no effect without --consensus-prefix");
    }
    if consensus_names_out.is_some() && consensus_prefix.is_none() {
        warn!("--write-consensus-path-names will write an empty file without --consensus-prefix");
    }

    info!("Loading graph from {}", gfa_in);
    let graph = parse_gfa(open_input(gfa_in, io_threads)?).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to parse GFA '{}': {}", gfa_in, e),
        )
    })?;
    info!(
        "Loaded {} nodes, {} edges, {} paths",
        graph.node_count(),
        graph.edge_count(),
        graph.path_count()
    );

    let blocks = parse_blocks(open_input(blocks_file, io_threads)?, &graph).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to parse blocks '{}': {}", blocks_file, e),
        )
    })?;
    info!("Loaded {} blocks from {}", blocks.len(), blocks_file);

    let config = SmoothConfig {
        num_threads: poa_threads.get(),
        scoring_params,
        consensus_prefix,
        alignment_mode,
        write_msa: maf_out.is_some(),
    };
    debug!(
        "POA scoring {:?}, {} alignment, {} smoothing threads",
        config.scoring_params,
        alignment_mode.as_str(),
        config.num_threads
    );

    let progress = LogProgress::default();
    let result = smooth_and_lace(
        &graph,
        &blocks,
        &config,
        || SpoaEngine::new(scoring_params, alignment_mode),
        &progress,
    )?;

    if let Some(path) = consensus_names_out {
        let mut writer = BufWriter::new(File::create(path)?);
        for name in &result.consensus_paths {
            writeln!(writer, "{}", name)?;
        }
        writer.flush()?;
        info!(
            "Wrote {} consensus path names to {}",
            result.consensus_paths.len(),
            path
        );
    }

    if let Some(path) = maf_out {
        let mut writer = BufWriter::new(File::create(path)?);
        write_maf(
            &mut writer,
            &result.maf_blocks,
            gfa_in,
            graph.path_count(),
            alignment_mode,
            poa_params,
        )?;
        writer.flush()?;
        info!("Wrote {} MAF blocks to {}", result.maf_blocks.len(), path);
    }

    let vanish: &[String] = if vanish_consensus {
        result.consensus_paths.as_slice()
    } else {
        &[]
    };
    let smoothed = finalize_graph(result.graph, vanish)?;

    info!("Writing smoothed graph to {}", output);
    if output == "-" {
        let stdout = io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        write_gfa(&smoothed, &mut writer)?;
        writer.flush()?;
    } else {
        let mut writer = BufWriter::new(File::create(output)?);
        write_gfa(&smoothed, &mut writer)?;
        writer.flush()?;
    }

    Ok(())
}

fn write_maf<W: Write>(
    writer: &mut W,
    blocks: &[MafBlock],
    input: &str,
    sequences: usize,
    mode: AlignmentMode,
    scoring: &str,
) -> io::Result<()> {
    write_maf_header(writer, input, sequences, mode, scoring)?;
    for block in blocks {
        write_maf_block(writer, block)?;
    }
    Ok(())
}

/// Drop the `vanish` paths, then compact the assembled graph: runs of nodes
/// that every path crosses together, including gap nodes next to block
/// nodes, become single nodes.
fn finalize_graph(mut graph: SequenceGraph, vanish: &[String]) -> io::Result<SequenceGraph> {
    if !vanish.is_empty() {
        let dropped: FxHashSet<&str> = vanish.iter().map(String::as_str).collect();
        graph.retain_paths(|name| !dropped.contains(name));
        info!("Dropped {} consensus paths", dropped.len());
    }
    let smoothed = unchop(&graph)?;
    info!(
        "Smoothed graph: {} bp in {} nodes ({} before compaction), {} edges",
        (0..smoothed.node_count())
            .map(|id| smoothed.node_sequence(id).len())
            .sum::<usize>(),
        smoothed.node_count(),
        graph.node_count(),
        smoothed.edge_count()
    );
    Ok(smoothed)
}

/// Open a plain or BGZF-compressed (`.gz`/`.bgz`) text input.
fn open_input(path: &str, threads: NonZeroUsize) -> io::Result<Box<dyn BufRead>> {
    if !Path::new(path).exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Input file '{}' not found", path),
        ));
    }
    let mut file = File::open(path)?;
    let reader: Box<dyn io::Read> = if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
        if !is_bgzf(&mut file)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "'{}' is regular gzip, not BGZF. Convert with: zcat '{}' | bgzip > output.gz",
                    path, path
                ),
            ));
        }
        Box::new(bgzf::io::MultithreadedReader::with_worker_count(
            threads, file,
        ))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

const BGZF_HEADER_SIZE: usize = 18;

/// Whether the stream starts with a BGZF block header. Short inputs are not
/// BGZF. The stream is rewound either way.
fn is_bgzf<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let result = match reader.read_exact(&mut header) {
        Ok(()) => Ok(header[0..2] == [0x1f, 0x8b]   // gzip magic
            && header[2] == 0x08                    // DEFLATE
            && header[3] == 0x04                    // FEXTRA
            && header[10..12] == [0x06, 0x00]       // XLEN=6
            && header[12..14] == [b'B', b'C']       // BC subfield
            && header[14..16] == [0x02, 0x00]), // SLEN=2
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    };
    reader.seek(SeekFrom::Start(0))?;
    result
}
