use blocklace::commands::smooth::run_smooth;
use blocklace::poa::{AlignmentMode, DEFAULT_SCORING_PARAMS};
use clap::Parser;
use log::error;
use rayon::ThreadPoolBuilder;
use std::io;
use std::num::NonZeroUsize;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN))]
    threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Realign collinear blocks of a variation graph and lace them back together.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Smooth a graph block by block with partial order alignment
    Smooth {
        #[clap(flatten)]
        common: CommonOpts,

        /// Input graph in GFA format (.gz/.bgz accepted)
        #[clap(short = 'g', long, value_parser)]
        gfa_in: String,

        /// Blocks to realign: 'block_id<TAB>path<TAB>begin<TAB>end' with 0-based step ranks
        #[clap(short = 'b', long, value_parser)]
        blocks: String,

        /// Output GFA file ('-' for stdout)
        #[clap(short = 'o', long, value_parser)]
        smoothed_out: String,

        /// POA scoring parameters: match,mismatch,gap_open1,gap_ext1[,gap_open2,gap_ext2]
        #[clap(short = 'p', long, value_parser, default_value_t = format_scoring_params())]
        poa_params: String,

        /// Add a consensus path per block, named <PREFIX><block_id>
        #[clap(short = 'Q', long, value_parser)]
        consensus_prefix: Option<String>,

        /// Drop consensus paths from the output graph after lacing
        #[clap(short = 'V', long, action)]
        vanish_consensus: bool,

        /// Write the names of the consensus paths to this file
        #[clap(short = 'f', long, value_parser)]
        write_consensus_path_names: Option<String>,

        /// Write the multiple sequence alignment of every block to this file in MAF format
        #[clap(short = 'm', long, value_parser)]
        write_msa_in_maf_format: Option<String>,

        /// Align globally (Needleman-Wunsch) instead of locally (Smith-Waterman)
        #[clap(short = 'Z', long, action)]
        change_alignment_mode: bool,

        /// Threads for block smoothing [default: --threads]
        #[clap(short = 'T', long, value_parser)]
        poa_threads: Option<NonZeroUsize>,
    },
}

fn format_scoring_params() -> String {
    let (m, n, g, e, q, c) = DEFAULT_SCORING_PARAMS;
    format!("{},{},{},{},{},{}", m, n, g, e, q, c)
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> io::Result<()> {
    match args {
        Args::Smooth {
            common,
            gfa_in,
            blocks,
            smoothed_out,
            poa_params,
            consensus_prefix,
            vanish_consensus,
            write_consensus_path_names,
            write_msa_in_maf_format,
            change_alignment_mode,
            poa_threads,
        } => {
            initialize(&common)?;
            run_smooth(
                &gfa_in,
                &blocks,
                &smoothed_out,
                &poa_params,
                consensus_prefix,
                vanish_consensus,
                write_consensus_path_names.as_deref(),
                write_msa_in_maf_format.as_deref(),
                if change_alignment_mode {
                    AlignmentMode::Global
                } else {
                    AlignmentMode::Local
                },
                poa_threads.unwrap_or(common.threads),
                common.threads,
            )
        }
    }
}

/// Initialize logging and the global thread pool from the common options
fn initialize(common: &CommonOpts) -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.threads.get())
        .build_global()
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to build global thread pool: {}", e),
            )
        })
}
