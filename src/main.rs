use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use kaiju_rs::alphabet;
use kaiju_rs::classify::{report_stats, run_pipeline, ResultWriter};
use kaiju_rs::config::{Mode, RunConfig};
use kaiju_rs::fm_index::FmIndex;
use kaiju_rs::seqreader::SequenceReader;

#[derive(Parser)]
#[command(
    name = "kaiju-rs",
    version,
    about = "Protein-level classification of sequencing reads against an FM-index of reference proteins"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an FM-index from a reference protein FASTA file
    Index {
        /// Reference proteins in FASTA format (optionally gzipped)
        #[arg(short = 'r', long)]
        reference: PathBuf,

        /// Name of the output .fmi file
        #[arg(short = 'o', long)]
        output: PathBuf,
    },

    /// Classify reads against a prebuilt index
    Classify {
        /// Name of the .fmi file
        #[arg(short = 'f', long = "fmi")]
        index: PathBuf,

        /// Reads in FASTA or FASTQ format (optionally gzipped)
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Second input file for paired-end reads
        #[arg(short = 'j', long)]
        input2: Option<PathBuf>,

        /// Name of the output file; stdout when omitted
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Run mode, either "mem" or "greedy"
        #[arg(short = 'a', long, default_value = "mem")]
        mode: String,

        /// Minimum match length in MEM mode
        #[arg(short = 'm', long, default_value_t = 11)]
        min_length: usize,

        /// Minimum match score in greedy mode
        #[arg(short = 's', long, default_value_t = 65)]
        min_score: i32,

        /// Seed length for finding matches in greedy mode
        #[arg(short = 'l', long, default_value_t = 7)]
        seed_length: usize,

        /// Number of mismatches allowed in greedy mode
        #[arg(short = 'e', long, default_value_t = 0)]
        mismatches: u32,

        /// Number of parallel threads; 0 uses all cores
        #[arg(short = 'z', long, default_value_t = 1)]
        threads: usize,
    },
}

fn init_logging(verbose: bool, debug: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if debug {
        builder.filter_level(LevelFilter::Debug);
    } else if verbose {
        builder.filter_level(LevelFilter::Info);
    }
    builder.format_timestamp(None).init();
}

fn build_index(reference: &PathBuf, output: &PathBuf) -> Result<()> {
    let reader = SequenceReader::open(reference)
        .with_context(|| format!("could not open reference file {}", reference.display()))?;

    let mut references = Vec::new();
    let mut skipped = 0usize;
    for record in reader {
        let record = record
            .with_context(|| format!("could not read reference file {}", reference.display()))?;
        if record.seq.bytes().all(alphabet::contains) {
            references.push((record.id, record.seq));
        } else {
            log::warn!(
                "skipping reference {:?}: contains residues outside the alphabet",
                record.id
            );
            skipped += 1;
        }
    }

    log::info!(
        "building index over {} reference sequences ({} skipped)",
        references.len(),
        skipped
    );
    let index = FmIndex::from_references(references).context("could not build index")?;
    index
        .save(output)
        .with_context(|| format!("could not write index to {}", output.display()))?;
    log::info!("index written to {}", output.display());
    Ok(())
}

fn classify(
    index_path: &PathBuf,
    input: &PathBuf,
    input2: Option<&PathBuf>,
    output: Option<&PathBuf>,
    config: &RunConfig,
) -> Result<()> {
    // all configuration problems are fatal before any worker starts
    config.validate()?;

    log::info!("Reading database");
    let index = FmIndex::load(index_path)
        .with_context(|| format!("could not open index file {}", index_path.display()))?;
    log::info!("index holds {} reference sequences", index.reference_count());

    let reader1 = SequenceReader::open(input)
        .with_context(|| format!("could not open input file {}", input.display()))?;
    let reader2 = input2
        .map(|path| {
            SequenceReader::open(path)
                .with_context(|| format!("could not open input file {}", path.display()))
        })
        .transpose()?;

    let sink: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("could not open file {} for writing", path.display())
        })?)),
        None => Box::new(io::stdout()),
    };
    let writer = ResultWriter::new(sink);

    log::info!("Start search using {} threads", config.num_threads);
    let start = Instant::now();
    let reads = reader1.chain(reader2.into_iter().flatten());
    let stats = run_pipeline(&index, config, reads, &writer)?;
    report_stats(start.elapsed(), &stats);
    log::info!("Finished.");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    match cli.command {
        Command::Index { reference, output } => build_index(&reference, &output),
        Command::Classify {
            index,
            input,
            input2,
            output,
            mode,
            min_length,
            min_score,
            seed_length,
            mismatches,
            threads,
        } => {
            let config = RunConfig {
                mode: mode.parse::<Mode>()?,
                min_match_length: min_length,
                min_score,
                seed_length,
                mismatches,
                num_threads: if threads == 0 {
                    num_cpus::get()
                } else {
                    threads
                },
            };
            classify(&index, &input, input2.as_ref(), output.as_ref(), &config)
        }
    }
}
